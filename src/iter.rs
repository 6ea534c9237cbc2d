//! Iterator helpers.

use std::iter::Zip;

/// Zips two iterators that are required to have the same length.
///
/// [`Iterator::zip`] silently stops at the shorter iterator. Landmark and keypoint lists always
/// have a fixed length, so a mismatch is a bug and this function panics instead.
#[track_caller]
pub fn zip_exact<A, B>(a: A, b: B) -> Zip<A::IntoIter, B::IntoIter>
where
    A: IntoIterator,
    B: IntoIterator,
    A::IntoIter: ExactSizeIterator,
    B::IntoIter: ExactSizeIterator,
{
    let a = a.into_iter();
    let b = b.into_iter();
    assert_eq!(
        a.len(),
        b.len(),
        "`zip_exact` called on iterators with different lengths"
    );

    a.zip(b)
}
