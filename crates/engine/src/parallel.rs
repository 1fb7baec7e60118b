use rayon::prelude::*;

/// Data-parallel helpers. Every loop takes an explicit `parallel` flag and
/// keeps the sequential path as the reference semantics, so deterministic
/// single-threaded runs stay available for testing.
pub fn for_each_mut<T, F>(items: &mut [T], parallel: bool, f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    if parallel {
        items
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, item)| f(idx, item));
        return;
    }

    for (idx, item) in items.iter_mut().enumerate() {
        f(idx, item);
    }
}

pub fn map_indices<T, F>(len: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if parallel {
        (0..len).into_par_iter().map(f).collect()
    } else {
        (0..len).map(f).collect()
    }
}

pub fn try_map_indices<T, E, F>(len: usize, parallel: bool, f: F) -> Result<Vec<T>, E>
where
    T: Send,
    E: Send,
    F: Fn(usize) -> Result<T, E> + Sync + Send,
{
    if parallel {
        (0..len).into_par_iter().map(f).collect()
    } else {
        (0..len).map(f).collect()
    }
}
