use criterion::{Criterion, criterion_group, criterion_main};
use envpanel::envfile::{FileModel, RenderMode, Renderer, generate_template};
use envpanel::models::VariableRegistry;
use std::hint::black_box;

/// A file shaped like a long-lived defaults file: sections, disabled
/// variables and quoted values.
fn sample_file(sections: usize) -> String {
    let mut text = String::new();
    for i in 0..sections {
        text.push_str(&format!("# Section {}\n", i));
        text.push_str(&format!("VAR_{}=value_{}\n", i, i));
        text.push_str(&format!("#DISABLED_{}=\"two words\"\n", i));
        text.push_str(&format!("QUOTED_{}='literal $HOME'\n\n", i));
    }
    text
}

fn benchmark_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("FileModel");

    let template = generate_template("aiscot");
    group.bench_function("load_template", |b| {
        b.iter(|| FileModel::load(black_box(&template)));
    });

    let large = sample_file(250);
    group.bench_function("load_1000_lines", |b| {
        b.iter(|| FileModel::load(black_box(&large)));
    });

    group.finish();
}

fn benchmark_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("Renderer");
    let registry = VariableRegistry::builtin();
    let renderer = Renderer::new(&registry, "aiscot");

    let untouched = FileModel::load(&sample_file(250));
    group.bench_function("structured_untouched", |b| {
        b.iter(|| renderer.render(black_box(&untouched), RenderMode::Structured, true));
    });

    let mut edited = untouched.clone();
    for i in 0..250 {
        edited.set_value(&format!("VAR_{}", i), "new value");
    }
    group.bench_function("structured_edited", |b| {
        b.iter(|| renderer.render(black_box(&edited), RenderMode::Structured, true));
    });

    group.bench_function("fresh", |b| {
        b.iter(|| renderer.render(black_box(&edited), RenderMode::Fresh, true));
    });

    group.finish();
}

criterion_group!(benches, benchmark_parse, benchmark_render);
criterion_main!(benches);
