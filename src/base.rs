//! Core message wrapper types.
//!
//! This module provides the reusable containers generated code stores message data in:
//!
//! - [`MessageField<T>`]: a lazily allocated singular sub-message
//! - [`RepeatedField<T>`]: a growable array whose cleared elements stay allocated
//! - [`CachedSize`]: the encoded size remembered between `compute_size` and `encode_raw`
//!
//! None of them release memory on `clear`. A message that is cleared and decoded again
//! reuses the boxes, strings and vectors it already owns.
//!
//! # Example
//!
//! ```
//! use tightbuf::base::RepeatedField;
//!
//! let mut names = RepeatedField::<String>::new();
//! names.add().push_str("first");
//! names.add().push_str("second");
//! assert_eq!(names.len(), 2);
//!
//! names.clear();
//! assert!(names.is_empty());
//!
//! // The cleared string allocation is handed back, emptied.
//! let reused = names.add();
//! assert!(reused.is_empty());
//! assert!(reused.capacity() >= "first".len());
//! ```

use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

/// Resets a value to its empty state while keeping owned allocations.
pub trait Clear {
    fn clear(&mut self);
}

impl Clear for String {
    fn clear(&mut self) {
        String::clear(self);
    }
}

impl Clear for Vec<u8> {
    fn clear(&mut self) {
        Vec::clear(self);
    }
}

/// Encoded size of a message as of its last `compute_size` call.
#[derive(Default)]
pub struct CachedSize(AtomicUsize);

impl CachedSize {
    pub const fn new() -> Self {
        CachedSize(AtomicUsize::new(0))
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, size: usize) {
        self.0.store(size, Ordering::Relaxed);
    }
}

impl Clone for CachedSize {
    fn clone(&self) -> Self {
        CachedSize(AtomicUsize::new(self.get()))
    }
}

impl fmt::Debug for CachedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.get().fmt(f)
    }
}

/// A singular message field.
///
/// The sub-message is boxed on first access. Clearing only marks the field absent;
/// the box is reset and handed out again the next time the field is initialised.
pub struct MessageField<T> {
    value: Option<Box<T>>,
    present: bool,
}

impl<T> MessageField<T> {
    pub const fn new() -> Self {
        MessageField {
            value: None,
            present: false,
        }
    }

    pub fn some(value: T) -> Self {
        MessageField {
            value: Some(Box::new(value)),
            present: true,
        }
    }

    pub const fn is_some(&self) -> bool {
        self.present
    }

    pub const fn is_none(&self) -> bool {
        !self.present
    }

    pub fn get(&self) -> Option<&T> {
        if self.present {
            self.value.as_deref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.present {
            self.value.as_deref_mut()
        } else {
            None
        }
    }

    pub fn set(&mut self, value: T) {
        match &mut self.value {
            Some(boxed) => **boxed = value,
            None => self.value = Some(Box::new(value)),
        }
        self.present = true;
    }

    /// Marks the field absent. The allocation is kept for reuse.
    pub fn clear(&mut self) {
        self.present = false;
    }

    /// Removes the value, giving up the allocation.
    pub fn take(&mut self) -> Option<T> {
        if !self.present {
            return None;
        }
        self.present = false;
        self.value.take().map(|boxed| *boxed)
    }
}

impl<T: Clear + Default> MessageField<T> {
    /// Returns the sub-message, initialising it to its default state if absent.
    pub fn get_or_init(&mut self) -> &mut T {
        if !self.present {
            match &mut self.value {
                Some(boxed) => boxed.clear(),
                None => self.value = Some(Box::default()),
            }
            self.present = true;
        }
        match &mut self.value {
            Some(boxed) => &mut **boxed,
            None => unreachable!("present message field without a value"),
        }
    }
}

impl<T> Default for MessageField<T> {
    fn default() -> Self {
        MessageField::new()
    }
}

impl<T: Clone> Clone for MessageField<T> {
    fn clone(&self) -> Self {
        match self.get() {
            Some(value) => MessageField::some(value.clone()),
            None => MessageField::new(),
        }
    }
}

impl<T: PartialEq> PartialEq for MessageField<T> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for MessageField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => write!(f, "Some({value:?})"),
            None => write!(f, "None"),
        }
    }
}

impl<T> From<Option<T>> for MessageField<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => MessageField::some(value),
            None => MessageField::new(),
        }
    }
}

/// Repeated field of messages, strings or bytes.
///
/// Elements past `len` are cleared values kept for reuse by [`RepeatedField::add`].
pub struct RepeatedField<T> {
    items: Vec<T>,
    len: usize,
}

impl<T> RepeatedField<T> {
    pub const fn new() -> Self {
        RepeatedField {
            items: Vec::new(),
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items[..self.len]
    }

    pub fn push(&mut self, value: T) {
        if self.len < self.items.len() {
            self.items[self.len] = value;
        } else {
            self.items.push(value);
        }
        self.len += 1;
    }

    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.items.remove(self.len))
    }

    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Marks all elements unused. Their allocations stay for later [`add`](Self::add) calls.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Number of allocated elements, used and cleared.
    pub fn reserved_len(&self) -> usize {
        self.items.len()
    }
}

impl<T: Clear + Default> RepeatedField<T> {
    /// Appends an empty element, reusing a cleared one when available.
    pub fn add(&mut self) -> &mut T {
        if self.len < self.items.len() {
            self.items[self.len].clear();
        } else {
            self.items.push(T::default());
        }
        self.len += 1;
        &mut self.items[self.len - 1]
    }
}

impl<T> Deref for RepeatedField<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> DerefMut for RepeatedField<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T> Default for RepeatedField<T> {
    fn default() -> Self {
        RepeatedField::new()
    }
}

impl<T: Clone> Clone for RepeatedField<T> {
    fn clone(&self) -> Self {
        RepeatedField {
            items: self.as_slice().to_vec(),
            len: self.len,
        }
    }
}

impl<T: PartialEq> PartialEq for RepeatedField<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: fmt::Debug> fmt::Debug for RepeatedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_slice().fmt(f)
    }
}

impl<T> From<Vec<T>> for RepeatedField<T> {
    fn from(items: Vec<T>) -> Self {
        let len = items.len();
        RepeatedField { items, len }
    }
}

impl<T> FromIterator<T> for RepeatedField<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        RepeatedField::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<'a, T> IntoIterator for &'a RepeatedField<T> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T> IntoIterator for &'a mut RepeatedField<T> {
    type Item = &'a mut T;
    type IntoIter = core::slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Clone, Debug, PartialEq)]
    struct Node {
        value: u32,
        label: String,
    }

    impl Clear for Node {
        fn clear(&mut self) {
            self.value = 0;
            self.label.clear();
        }
    }

    #[test]
    fn message_field_is_lazy() {
        let mut field = MessageField::<Node>::new();
        assert!(field.is_none());
        assert_eq!(field.get(), None);

        field.get_or_init().value = 5;
        assert!(field.is_some());
        assert_eq!(field.get().map(|n| n.value), Some(5));
    }

    #[test]
    fn message_field_clear_keeps_box_and_resets_on_reuse() {
        let mut field = MessageField::<Node>::new();
        let node = field.get_or_init();
        node.value = 9;
        node.label.push_str("stale");
        let ptr = &*node as *const Node;

        field.clear();
        assert!(field.is_none());
        assert_eq!(field.get(), None);

        let node = field.get_or_init();
        assert_eq!(&*node as *const Node, ptr);
        assert_eq!(*node, Node::default());
        assert!(node.label.capacity() >= "stale".len());
    }

    #[test]
    fn message_field_equality_ignores_stale_values() {
        let mut a = MessageField::<Node>::new();
        a.get_or_init().value = 3;
        a.clear();
        let b = MessageField::<Node>::new();
        assert_eq!(a, b);
        assert_eq!(format!("{a:?}"), "None");
    }

    #[test]
    fn repeated_field_reuses_cleared_elements() {
        let mut field = RepeatedField::<Node>::new();
        field.add().value = 1;
        field.add().label.push_str("two");
        assert_eq!(field.len(), 2);

        field.clear();
        assert!(field.is_empty());
        assert_eq!(field.reserved_len(), 2);

        let first = field.add();
        assert_eq!(*first, Node::default());
        let second = field.add();
        assert!(second.label.is_empty());
        assert!(second.label.capacity() >= 3);
        assert_eq!(field.reserved_len(), 2);
    }

    #[test]
    fn repeated_field_equality_and_clone_use_active_elements() {
        let mut a = RepeatedField::<String>::new();
        a.push("x".to_string());
        a.push("y".to_string());
        a.truncate(1);

        let b: RepeatedField<String> = vec!["x".to_string()].into();
        assert_eq!(a, b);
        assert_eq!(a.clone().reserved_len(), 1);
        assert_eq!(a.pop().as_deref(), Some("x"));
        assert!(a.is_empty());
    }

    #[test]
    fn cached_size_clone() {
        let size = CachedSize::new();
        size.set(12);
        assert_eq!(size.clone().get(), 12);
    }
}
