//! Key ordering.

use std::cmp::Ordering;

/// Locale id persisted for [`CodePointOrder`].
pub const INVARIANT_LOCALE: u32 = 127;

/// Total order over keys, injected when a tree is created or opened.
///
/// The order must be deterministic for the lifetime of a store. Its
/// [`locale_id`](KeyComparator::locale_id) is written to the tree header and
/// checked on every open, so a store cannot be reopened under a different
/// order by accident.
pub trait KeyComparator {
    fn compare(&self, left: &[u8], right: &[u8]) -> Ordering;

    /// Identity persisted in the tree header.
    fn locale_id(&self) -> u32;
}

/// Byte-wise lexicographic order.
///
/// For UTF-8 keys this is Unicode code-point order.
///
/// # Example
/// ```
/// use std::cmp::Ordering;
/// use shadowtree::{CodePointOrder, KeyComparator};
///
/// let cmp = CodePointOrder;
/// assert_eq!(cmp.compare(b"", b"a"), Ordering::Less);
/// assert_eq!(cmp.compare(b"ab", b"b"), Ordering::Less);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct CodePointOrder;

impl KeyComparator for CodePointOrder {
    #[inline]
    fn compare(&self, left: &[u8], right: &[u8]) -> Ordering {
        left.cmp(right)
    }

    fn locale_id(&self) -> u32 {
        INVARIANT_LOCALE
    }
}
