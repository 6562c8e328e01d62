use guava::HashMap;

// Run the test on different configurations of a `HashMap`.
pub fn with_map<V>(mut test: impl FnMut(&dyn Fn() -> HashMap<V>)) {
    // The default lazily grown table.
    test(&HashMap::new);

    // A table with segments pre-published, so growth rarely runs.
    test(&(|| HashMap::builder().capacity(1 << 12).build()));

    // A small reclamation batch to stress the retirement path.
    test(
        &(|| {
            HashMap::builder()
                .collector(seize::Collector::new().batch_size(8))
                .build()
        }),
    );
}

// Returns the number of threads to use for stress testing.
pub fn threads() -> usize {
    std::thread::available_parallelism()
        .map(Into::into)
        .unwrap_or(8)
        .min(8)
}
