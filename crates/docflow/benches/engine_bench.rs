//! Benchmarks of expansion, propagation and action dispatch.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use docflow::{
    ActionFlags, ActionRequest, CellKey, ComponentId, ComponentRegistry, ComponentSpec, Document,
    Value,
};

fn document(children: impl IntoIterator<Item = ComponentSpec>) -> Document {
    let mut root = ComponentSpec::new("document");
    for child in children {
        root = root.child(child);
    }
    Document::new(ComponentRegistry::with_builtins(), &root).expect("document builds")
}

fn id(doc: &mut Document, path: &str) -> ComponentId {
    let root = doc.root();
    doc.resolve_path_to_id(path, root).expect("path resolves")
}

/// A sum over `n` numbers plus a mirror of the sum.
fn sum_document(n: usize) -> Document {
    let mut sum = ComponentSpec::new("sum").named("s");
    for i in 0..n {
        sum = sum.child(ComponentSpec::new("number").named(format!("n{i}")).text(i.to_string()));
    }
    document([
        sum,
        ComponentSpec::new("number")
            .named("total")
            .child(ComponentSpec::copy_prop("s", "value")),
    ])
}

/// Build a sequence of `n` numbers and read every state variable
fn bench_sequence_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence_expansion");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("expand", n), &n, |b, &n| {
            b.iter(|| {
                let mut doc = document([ComponentSpec::new("sequence")
                    .named("s")
                    .attribute("length", n as f64)]);
                black_box(doc.return_all_state_variables(true, false).len());
            });
        });

        // Shifting `from` keeps the replacements
        group.bench_with_input(BenchmarkId::new("shift_from", n), &n, |b, &n| {
            let mut doc = document([ComponentSpec::new("sequence")
                .named("s")
                .attribute("from", 1)
                .attribute("length", n as f64)]);
            let s = id(&mut doc, "s");
            doc.return_all_state_variables(true, false);
            let mut from = 1.0;
            b.iter(|| {
                from += 1.0;
                doc.dispatch(CellKey::new(s, "from"), Value::from(from), ActionFlags::default())
                    .expect("from is writable");
                black_box(doc.return_all_state_variables(true, false).len());
            });
        });
    }

    group.finish();
}

/// Change one term and read the mirrored sum
fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("one_term", n), &n, |b, &n| {
            let mut doc = sum_document(n);
            let first = id(&mut doc, "n0");
            let total = id(&mut doc, "total");
            let mut value = 0.0;
            b.iter(|| {
                value += 1.0;
                doc.dispatch(CellKey::new(first, "value"), Value::from(value), ActionFlags::default())
                    .expect("term is writable");
                black_box(doc.get_value(total, "value").expect("sum"));
            });
        });

        // Memoized reads with nothing changed
        group.bench_with_input(BenchmarkId::new("steady_state", n), &n, |b, &n| {
            let mut doc = sum_document(n);
            let total = id(&mut doc, "total");
            doc.get_value(total, "value").expect("sum");
            b.iter(|| black_box(doc.get_value(total, "value").expect("sum")));
        });
    }

    group.finish();
}

/// Burst of `n` skippable moves followed by one observation
fn bench_skippable_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("skippable_burst");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("drag", n), &n, |b, &n| {
            let mut doc = document([ComponentSpec::new("point").named("P")]);
            let p = id(&mut doc, "P");
            b.iter(|| {
                for i in 0..n {
                    let request = ActionRequest::new(p, "movePoint")
                        .arg("x", i as f64)
                        .skippable();
                    doc.request_action(request).expect("move accepted");
                }
                black_box(doc.get_value(p, "xs").expect("coordinates"));
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_sequence_expansion,
    bench_propagation,
    bench_skippable_burst,
);
criterion_main!(benches);
