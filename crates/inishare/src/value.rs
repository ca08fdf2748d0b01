//! Scalar conversion between typed values and INI text.
//!
//! Booleans are stored as `1`/`0`. Numbers use the invariant `.` decimal
//! separator. Reading is lenient where old files disagree with the current
//! encoding: integers accept `true`/`false`, booleans accept `true` or `1`.

use crate::error::{Result, StoreError};

/// Encode a value as the text stored after `key=`.
pub trait ToIni {
    fn to_ini(&self) -> String;
}

/// Decode stored text back into a value.
pub trait FromIni: ToIni + Clone + Sized {
    fn from_ini(text: &str) -> Result<Self>;

    /// Decode with the caller's default at hand. Empty text yields the default.
    fn from_ini_or(text: &str, default: &Self) -> Result<Self> {
        if text.is_empty() {
            return Ok(default.clone());
        }
        Self::from_ini(text)
    }
}

impl<T: ToIni + ?Sized> ToIni for &T {
    fn to_ini(&self) -> String {
        (**self).to_ini()
    }
}

impl ToIni for str {
    fn to_ini(&self) -> String {
        self.to_string()
    }
}

impl ToIni for String {
    fn to_ini(&self) -> String {
        self.clone()
    }
}

impl FromIni for String {
    fn from_ini(text: &str) -> Result<Self> {
        Ok(text.to_string())
    }

    /// A `"0"`/`"1"` default marks a flag stored as a string; `true`/`false`
    /// written by other tools is mapped onto it.
    fn from_ini_or(text: &str, default: &Self) -> Result<Self> {
        if text.is_empty() {
            return Ok(default.clone());
        }
        if default == "0" || default == "1" {
            if text.eq_ignore_ascii_case("true") {
                return Ok("1".to_string());
            }
            if text.eq_ignore_ascii_case("false") {
                return Ok("0".to_string());
            }
        }
        Ok(text.to_string())
    }
}

impl ToIni for bool {
    fn to_ini(&self) -> String {
        let text = if *self { "1" } else { "0" };
        text.to_string()
    }
}

impl FromIni for bool {
    fn from_ini(text: &str) -> Result<Self> {
        Ok(text.eq_ignore_ascii_case("true") || text == "1")
    }
}

macro_rules! impl_integer {
    ($($ty:ty),*) => {$(
        impl ToIni for $ty {
            fn to_ini(&self) -> String {
                self.to_string()
            }
        }

        impl FromIni for $ty {
            fn from_ini(text: &str) -> Result<Self> {
                if text.eq_ignore_ascii_case("true") {
                    return Ok(1);
                }
                if text.eq_ignore_ascii_case("false") {
                    return Ok(0);
                }
                text.trim().parse::<$ty>().map_err(|e| {
                    StoreError::Conversion(format!(
                        "'{}' is not a valid {}: {}",
                        text,
                        stringify!($ty),
                        e
                    ))
                })
            }
        }
    )*};
}

macro_rules! impl_float {
    ($($ty:ty),*) => {$(
        impl ToIni for $ty {
            fn to_ini(&self) -> String {
                self.to_string()
            }
        }

        impl FromIni for $ty {
            fn from_ini(text: &str) -> Result<Self> {
                text.trim().parse::<$ty>().map_err(|e| {
                    StoreError::Conversion(format!(
                        "'{}' is not a valid {}: {}",
                        text,
                        stringify!($ty),
                        e
                    ))
                })
            }
        }
    )*};
}

impl_integer!(i16, i32, i64, u16, u32, u64, usize);
impl_float!(f32, f64);
