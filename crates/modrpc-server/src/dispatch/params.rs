//! Typed positional parameter lists.
//!
//! A method's parameters are declared as a tuple type, e.g. `(i32, String)`.
//! Each element is decoded from the payload array at the same position.

use modrpc_protocol::PayloadError;
use modrpc_protocol::error::short_type_name;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Declared type of one parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub type_name: String,
    /// Reference/out-style parameter. Contracts containing one do not build.
    pub by_ref: bool,
}

/// A single positional parameter.
pub trait Param: Sized + Send + 'static {
    fn info() -> ParamInfo;
    fn from_arg(value: Value) -> Result<Self, serde_json::Error>;
}

impl<T: DeserializeOwned + Send + 'static> Param for T {
    fn info() -> ParamInfo {
        ParamInfo {
            type_name: short_type_name(std::any::type_name::<T>()),
            by_ref: false,
        }
    }

    fn from_arg(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Marks a parameter passed by reference (an in/out parameter).
///
/// Positional JSON payloads cannot carry values back to the caller, so a
/// contract declaring one is rejected when the dispatch table is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ByRef<T>(pub T);

impl<T: DeserializeOwned + Send + 'static> Param for ByRef<T> {
    fn info() -> ParamInfo {
        ParamInfo {
            type_name: format!("ByRef<{}>", short_type_name(std::any::type_name::<T>())),
            by_ref: true,
        }
    }

    fn from_arg(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value).map(ByRef)
    }
}

/// An ordered parameter list, implemented for tuples of [`Param`]s.
pub trait Params: Sized + Send + 'static {
    fn describe() -> Vec<ParamInfo>;
    fn from_args(args: Vec<Value>) -> Result<Self, PayloadError>;
}

fn decode<P: Param>(index: usize, value: Option<Value>) -> Result<P, PayloadError> {
    P::from_arg(value.unwrap_or(Value::Null)).map_err(|e| PayloadError::ArgumentType {
        index,
        expected: P::info().type_name,
        reason: e.to_string(),
    })
}

fn check_count(expected: usize, args: &[Value]) -> Result<(), PayloadError> {
    if args.len() != expected {
        return Err(PayloadError::ArgumentCount {
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

impl Params for () {
    fn describe() -> Vec<ParamInfo> {
        Vec::new()
    }

    fn from_args(args: Vec<Value>) -> Result<Self, PayloadError> {
        check_count(0, &args)
    }
}

macro_rules! impl_params {
    ($count:expr; $($idx:tt $name:ident),+) => {
        impl<$($name: Param),+> Params for ($($name,)+) {
            fn describe() -> Vec<ParamInfo> {
                vec![$($name::info()),+]
            }

            fn from_args(args: Vec<Value>) -> Result<Self, PayloadError> {
                check_count($count, &args)?;
                let mut args = args.into_iter();
                Ok(($(decode::<$name>($idx, args.next())?,)+))
            }
        }
    };
}

impl_params!(1; 0 A);
impl_params!(2; 0 A, 1 B);
impl_params!(3; 0 A, 1 B, 2 C);
impl_params!(4; 0 A, 1 B, 2 C, 3 D);
impl_params!(5; 0 A, 1 B, 2 C, 3 D, 4 E);
impl_params!(6; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F);
impl_params!(7; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G);
impl_params!(8; 0 A, 1 B, 2 C, 3 D, 4 E, 5 F, 6 G, 7 H);
