//! Structural hashing for message fields.
//!
//! `f32`/`f64` do not implement [`Hash`], and `HashMap` iteration order is arbitrary,
//! so generated messages hash their fields through [`FieldHash`] instead. Floats hash
//! their bit pattern with `-0.0` folded onto `0.0`, maps combine per-entry hashes
//! order-independently. Values equal under the generated `PartialEq` hash equally.

use core::hash::{BuildHasher, Hash, Hasher};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;

use crate::base::{MessageField, RepeatedField};
use crate::containers::UnknownFields;
use crate::enums::EnumValue;

pub trait FieldHash {
    fn field_hash<H: Hasher>(&self, state: &mut H);
}

macro_rules! field_hash_via_hash {
    ($($ty:ty),*) => {
        $(
            impl FieldHash for $ty {
                #[inline]
                fn field_hash<H: Hasher>(&self, state: &mut H) {
                    Hash::hash(self, state);
                }
            }
        )*
    };
}

field_hash_via_hash!(bool, i32, i64, u32, u64, String, Vec<u8>, UnknownFields);

impl FieldHash for f32 {
    #[inline]
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        let bits = if *self == 0.0 { 0 } else { self.to_bits() };
        state.write_u32(bits);
    }
}

impl FieldHash for f64 {
    #[inline]
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        let bits = if *self == 0.0 { 0 } else { self.to_bits() };
        state.write_u64(bits);
    }
}

impl<E> FieldHash for EnumValue<E> {
    #[inline]
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.number());
    }
}

impl<T: FieldHash + ?Sized> FieldHash for Box<T> {
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        (**self).field_hash(state);
    }
}

impl<T: FieldHash> FieldHash for [T] {
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.len());
        for item in self {
            item.field_hash(state);
        }
    }
}

impl FieldHash for Vec<f32> {
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().field_hash(state);
    }
}

impl FieldHash for Vec<f64> {
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().field_hash(state);
    }
}

impl<E> FieldHash for Vec<EnumValue<E>> {
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().field_hash(state);
    }
}

macro_rules! field_hash_for_vec {
    ($($ty:ty),*) => {
        $(
            impl FieldHash for Vec<$ty> {
                fn field_hash<H: Hasher>(&self, state: &mut H) {
                    self.as_slice().field_hash(state);
                }
            }
        )*
    };
}

field_hash_for_vec!(bool, i32, i64, u32, u64);

impl<T: FieldHash> FieldHash for RepeatedField<T> {
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().field_hash(state);
    }
}

impl<T: FieldHash> FieldHash for MessageField<T> {
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        match self.get() {
            Some(value) => {
                state.write_u8(1);
                value.field_hash(state);
            }
            None => state.write_u8(0),
        }
    }
}

impl<T: FieldHash> FieldHash for Option<T> {
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Some(value) => {
                state.write_u8(1);
                value.field_hash(state);
            }
            None => state.write_u8(0),
        }
    }
}

impl<K: FieldHash, V: FieldHash, S: BuildHasher> FieldHash for HashMap<K, V, S> {
    fn field_hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent: sum of independently hashed entries.
        let combined = self.iter().fold(0u64, |acc, (key, value)| {
            let mut entry = DefaultHasher::new();
            key.field_hash(&mut entry);
            value.field_hash(&mut entry);
            acc.wrapping_add(entry.finish())
        });
        state.write_usize(self.len());
        state.write_u64(combined);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of<T: FieldHash + ?Sized>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.field_hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn signed_zero_hashes_equal() {
        assert_eq!(hash_of(&0.0f32), hash_of(&-0.0f32));
        assert_eq!(hash_of(&0.0f64), hash_of(&-0.0f64));
        assert_ne!(hash_of(&1.0f64), hash_of(&2.0f64));
    }

    #[test]
    fn map_hash_ignores_insertion_order() {
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        for i in 0..64 {
            a.insert(format!("key{i}"), i as f64);
        }
        for i in (0..64).rev() {
            b.insert(format!("key{i}"), i as f64);
        }
        assert_eq!(hash_of(&a), hash_of(&b));
        b.insert("key0".to_string(), 100.0);
        assert_ne!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn repeated_hash_is_ordered() {
        let a = vec![1i32, 2, 3];
        let b = vec![3i32, 2, 1];
        assert_ne!(hash_of(&a), hash_of(&b));
    }
}
