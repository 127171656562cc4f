mod batch;
mod compare;
mod fetch;
pub mod server;

pub use batch::*;
pub use compare::*;
pub use fetch::*;
pub use server::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}
