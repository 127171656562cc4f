use std::hint::black_box;
use std::io::Cursor;

use candle::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imsim::FeatureExtractor;
use imsim::model::{ModelKind, ResNet};
use imsim::preprocess::Preprocessor;
use imsim::similarity::{FeatureVector, cosine_similarity};

fn encode(format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(640, 480, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn bench_cosine(c: &mut Criterion) {
    let mut group = c.benchmark_group("余弦相似度");
    for dim in [512, 2048] {
        let a = FeatureVector::new((0..dim).map(|i| (i as f32).sin()).collect());
        let b = FeatureVector::new((0..dim).map(|i| (i as f32).cos()).collect());
        group.throughput(Throughput::Elements(dim as u64));
        group.bench_function(format!("{dim} 维"), |bench| {
            bench.iter(|| cosine_similarity(black_box(&a), black_box(&b)).unwrap())
        });
    }
    group.finish();
}

fn bench_preprocess(c: &mut Criterion) {
    let preprocessor = Preprocessor::default();
    let png = encode(ImageFormat::Png);
    let jpg = encode(ImageFormat::Jpeg);
    let img = preprocessor.decode(&jpg).unwrap();

    let mut group = c.benchmark_group("预处理");
    group.throughput(Throughput::Elements(1));
    group.bench_function("JPEG 解码", |b| b.iter(|| preprocessor.decode(black_box(&jpg)).unwrap()));
    group.bench_function("PNG 解码", |b| b.iter(|| preprocessor.decode(black_box(&png)).unwrap()));
    group.bench_function("缩放与归一化", |b| b.iter(|| preprocessor.to_input(black_box(&img))));
    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    // 随机初始化的权重，只用于衡量推理耗时
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = ResNet::from_var_builder(ModelKind::Resnet18, vb, Device::Cpu).unwrap();
    let preprocessor = Preprocessor::default();
    let input = preprocessor.process(&encode(ImageFormat::Jpeg)).unwrap();

    let mut group = c.benchmark_group("特征提取");
    group.sample_size(10);
    for batch in [1, 8] {
        let inputs = vec![input.clone(); batch];
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_function(format!("resnet18 x{batch}"), |b| b.iter(|| model.extract(black_box(&inputs)).unwrap()));
    }
    group.finish();
}

criterion_group!(benches, bench_cosine, bench_preprocess, bench_extract);
criterion_main!(benches);
