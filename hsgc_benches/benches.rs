use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use hsgc::Heap;

/// Objects allocated into a heap with every Nth one rooted by a boxed slot.
///
/// Slots are boxed so their addresses stay fixed while registered.
struct RootedWorkload {
    slots: Vec<Box<*mut u8>>,
}

impl RootedWorkload {
    /// Allocate `objects` blocks of `size` bytes, rooting every `root_every`th one.
    fn allocate(heap: &mut Heap, objects: usize, size: usize, root_every: usize) -> Self {
        let mut slots = Vec::new();

        for i in 0..objects {
            let object = heap.alloc(size);

            if i % root_every == 0 {
                let mut slot = Box::new(object.as_ptr());
                unsafe { heap.register_root(&mut *slot) };
                slots.push(slot);
            }
        }

        RootedWorkload { slots }
    }

    /// Unregister every slot from `heap`.
    fn release(self, heap: &mut Heap) {
        for mut slot in self.slots {
            heap.unregister_root(&mut *slot);
        }
    }
}

fn alloc_benchmark(c: &mut Criterion) {
    c.bench_function("alloc 1000 x 64B", |b| {
        b.iter_batched(
            Heap::new,
            |mut heap| {
                for _ in 0..1000 {
                    heap.alloc(64);
                }
                heap
            },
            BatchSize::SmallInput,
        )
    });
}

fn collect_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");

    for root_every in [1, 10, 100] {
        group.bench_function(format!("10000 objects, root every {root_every}"), |b| {
            b.iter_batched(
                || {
                    let mut heap = Heap::new();
                    let workload = RootedWorkload::allocate(&mut heap, 10_000, 32, root_every);
                    (heap, workload)
                },
                |(mut heap, workload)| {
                    let stats = heap.collect();
                    workload.release(&mut heap);
                    stats
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, alloc_benchmark, collect_benchmark);
criterion_main!(benches);
