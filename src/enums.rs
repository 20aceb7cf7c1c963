//! Enum support for generated code.
//!
//! Generated enums implement [`ProtoEnum`]. Enum-typed fields store an
//! [`EnumValue<E>`], which keeps the raw number read from the wire so that values
//! added to the schema after this code was generated survive a decode/encode cycle
//! unchanged.
//!
//! ```
//! use tightbuf::enums::{EnumValue, ProtoEnum};
//!
//! #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
//! enum Suit { Hearts = 0, Spades = 1 }
//!
//! impl ProtoEnum for Suit {
//!     const NAME: &'static str = "cards.Suit";
//!     fn from_number(number: i32) -> Option<Self> {
//!         match number { 0 => Some(Suit::Hearts), 1 => Some(Suit::Spades), _ => None }
//!     }
//!     fn number(self) -> i32 { self as i32 }
//!     fn name(self) -> &'static str {
//!         match self { Suit::Hearts => "HEARTS", Suit::Spades => "SPADES" }
//!     }
//!     fn from_name(name: &str) -> Option<Self> {
//!         match name { "HEARTS" => Some(Suit::Hearts), "SPADES" => Some(Suit::Spades), _ => None }
//!     }
//! }
//!
//! let known = EnumValue::from(Suit::Spades);
//! assert_eq!(known.get(), Some(Suit::Spades));
//!
//! let unknown = EnumValue::<Suit>::from_number(42);
//! assert_eq!(unknown.get(), None);
//! assert_eq!(unknown.number(), 42);
//! ```

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// Mapping between a generated Rust enum and its wire numbers and schema names.
pub trait ProtoEnum: Copy + Eq + fmt::Debug + 'static {
    /// Fully qualified schema name.
    const NAME: &'static str;

    fn from_number(number: i32) -> Option<Self>;
    fn number(self) -> i32;
    fn name(self) -> &'static str;
    fn from_name(name: &str) -> Option<Self>;
}

/// Raw enum number as stored in a message field.
#[repr(transparent)]
pub struct EnumValue<E> {
    number: i32,
    _marker: PhantomData<fn() -> E>,
}

impl<E> EnumValue<E> {
    pub const fn from_number(number: i32) -> Self {
        EnumValue {
            number,
            _marker: PhantomData,
        }
    }

    pub const fn number(self) -> i32 {
        self.number
    }
}

impl<E: ProtoEnum> EnumValue<E> {
    /// The symbolic value, or `None` if the number is not known to this schema version.
    pub fn get(self) -> Option<E> {
        E::from_number(self.number)
    }

    pub fn is_known(self) -> bool {
        self.get().is_some()
    }
}

impl<E: ProtoEnum> From<E> for EnumValue<E> {
    fn from(value: E) -> Self {
        EnumValue::from_number(value.number())
    }
}

impl<E> Clone for EnumValue<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for EnumValue<E> {}

impl<E> Default for EnumValue<E> {
    fn default() -> Self {
        EnumValue::from_number(0)
    }
}

impl<E> PartialEq for EnumValue<E> {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl<E> Eq for EnumValue<E> {}

impl<E: ProtoEnum> PartialEq<E> for EnumValue<E> {
    fn eq(&self, other: &E) -> bool {
        self.number == other.number()
    }
}

impl<E> Hash for EnumValue<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number.hash(state);
    }
}

impl<E: ProtoEnum> fmt::Debug for EnumValue<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => write!(f, "{}", value.name()),
            None => write!(f, "{}", self.number),
        }
    }
}
