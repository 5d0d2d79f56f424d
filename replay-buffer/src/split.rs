use rand::rngs::StdRng;
use rand::SeedableRng;

/// Splits `examples` into a train and a test partition. The same input, fraction and seed always
/// produce the same partitions. Each partition keeps the relative order of the input.
pub fn split_train_test<T: Clone>(
    examples: &[T],
    test_fraction: f32,
    seed: u64,
) -> (Vec<T>, Vec<T>) {
    assert!(
        (0.0..1.0).contains(&test_fraction),
        "test_fraction must be in [0, 1) but was {}",
        test_fraction
    );

    let num_test = test_size(examples.len(), test_fraction);

    if num_test == 0 {
        return (examples.to_vec(), Vec::new());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut is_test = vec![false; examples.len()];

    for i in rand::seq::index::sample(&mut rng, examples.len(), num_test) {
        is_test[i] = true;
    }

    let mut train = Vec::with_capacity(examples.len() - num_test);
    let mut test = Vec::with_capacity(num_test);

    for (example, is_test) in examples.iter().zip(is_test) {
        if is_test {
            test.push(example.clone());
        } else {
            train.push(example.clone());
        }
    }

    (train, test)
}

pub fn test_size(num_examples: usize, test_fraction: f32) -> usize {
    ((num_examples as f64 * test_fraction as f64).round() as usize).min(num_examples)
}
