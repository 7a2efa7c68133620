/// Split `items` into consecutive batches of `size`, preserving order.
///
/// A non-positive `size` is treated as 1. The last batch may be shorter.
pub fn chunk<T: Clone>(items: &[T], size: i64) -> Vec<Vec<T>> {
    let size = usize::try_from(size).ok().filter(|s| *s > 0).unwrap_or(1);
    items.chunks(size).map(<[T]>::to_vec).collect()
}
