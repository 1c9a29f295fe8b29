//! Argument fingerprints
//!
//! A fingerprint is the SHA-256 of the JSON serialization of a call's bound
//! arguments, taken as an ordered list of `(name, value)` pairs.
//!
//! The list order is part of the hash: the same pairs presented in a
//! different order produce a different fingerprint. Binding through a
//! [`Signature`] always yields declaration order, so checkpointed calls are
//! stable; callers hashing raw [`Arguments`] must keep their order fixed.
//! Stored history depends on this, so it must not change silently.
//!
//! Tables hash by cell content: two record batches with the same schema and
//! the same cells fingerprint identically regardless of how their buffers
//! are laid out.

use crate::{Error, Result};
use arrow::array::Array;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use serde::ser::{Error as _, SerializeStruct};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// A single argument value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArgValue {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer above `i64::MAX`; smaller values are [`ArgValue::Int`]
    UInt(u64),
    /// Finite float
    Float(f64),
    /// String
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Sequence
    List(Vec<ArgValue>),
    /// Ordered mapping
    Map(Vec<(String, ArgValue)>),
    /// Tabular dataset, compared by cell content
    #[serde(serialize_with = "serialize_table")]
    Table(RecordBatch),
}

impl ArgValue {
    fn check_representable(&self) -> Result<()> {
        match self {
            Self::Float(f) if !f.is_finite() => Err(Error::Serialization(format!(
                "non-finite float {f} has no stable representation"
            ))),
            Self::List(items) => items.iter().try_for_each(Self::check_representable),
            Self::Map(pairs) => pairs.iter().try_for_each(|(_, v)| v.check_representable()),
            _ => Ok(()),
        }
    }
}

/// Cell-content view of a record batch: schema then column-major cells.
fn serialize_table<S: Serializer>(
    batch: &RecordBatch,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    let schema: Vec<(String, String, bool)> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| (f.name().clone(), f.data_type().to_string(), f.is_nullable()))
        .collect();

    let options = FormatOptions::default();
    let mut columns: Vec<Vec<Option<String>>> = Vec::with_capacity(batch.num_columns());
    for column in batch.columns() {
        let formatter = ArrayFormatter::try_new(column.as_ref(), &options).map_err(|e| {
            S::Error::custom(format!("column type {} is not hashable: {e}", column.data_type()))
        })?;
        let mut cells = Vec::with_capacity(column.len());
        for row in 0..column.len() {
            if column.is_null(row) {
                cells.push(None);
            } else {
                let cell = formatter.value(row).try_to_string().map_err(S::Error::custom)?;
                cells.push(Some(cell));
            }
        }
        columns.push(cells);
    }

    let mut state = serializer.serialize_struct("Table", 2)?;
    state.serialize_field("schema", &schema)?;
    state.serialize_field("columns", &columns)?;
    state.end()
}

macro_rules! arg_from {
    ($variant:ident: $($ty:ty => $conv:expr),* $(,)?) => {
        $(
            impl From<$ty> for ArgValue {
                fn from(value: $ty) -> Self {
                    Self::$variant($conv(value))
                }
            }
        )*
    };
}

arg_from!(Int: i64 => |v| v, i32 => i64::from, i16 => i64::from, i8 => i64::from,
    u32 => i64::from, u16 => i64::from, u8 => i64::from);
impl From<u64> for ArgValue {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(Self::UInt(value), Self::Int)
    }
}

impl From<usize> for ArgValue {
    fn from(value: usize) -> Self {
        // usize is at most 64 bits on every supported target
        Self::from(value as u64)
    }
}

arg_from!(Float: f64 => |v| v, f32 => f64::from);
arg_from!(Bool: bool => |v| v);
arg_from!(Str: String => |v| v, &str => str::to_string, &String => Clone::clone);
arg_from!(Table: RecordBatch => |v| v, &RecordBatch => Clone::clone);

impl<T: Into<Self>> From<Vec<T>> for ArgValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Arguments supplied to one call, in the order the caller presents them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    pairs: Vec<(String, ArgValue)>,
}

impl Arguments {
    /// Empty argument list
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an argument (builder style)
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Append an argument, replacing an earlier one with the same name
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<ArgValue>) {
        let name = name.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((name, value)),
        }
    }

    /// Value of a named argument
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.pairs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Number of arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when no argument was supplied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Iterate `(name, value)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Bind in the order presented, without a signature
    #[must_use]
    pub fn into_bound(self) -> BoundArguments {
        BoundArguments { pairs: self.pairs }
    }
}

impl<K: Into<String>, V: Into<ArgValue>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut args = Self::new();
        for (k, v) in iter {
            args.push(k, v);
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Parameter {
    name: String,
    default: Option<ArgValue>,
}

/// Declared parameters of a checkpointed function.
///
/// ```rust
/// use resnap::fingerprint::{Arguments, Signature};
///
/// let signature = Signature::new().param("a").param_with_default("scale", 2);
/// let bound = signature.bind(&Arguments::new().with("a", 10))?;
/// assert_eq!(bound.names(), vec!["a", "scale"]);
/// # Ok::<(), resnap::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<Parameter>,
}

impl Signature {
    /// Signature with no parameters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required parameter
    #[must_use]
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Declare a parameter with a default value
    #[must_use]
    pub fn param_with_default(mut self, name: impl Into<String>, default: impl Into<ArgValue>) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    /// Bind call arguments to the declared parameters.
    ///
    /// The result follows declaration order and has every default applied.
    ///
    /// # Errors
    /// Returns `Binding` if an argument is unknown or a required one is missing
    pub fn bind(&self, args: &Arguments) -> Result<BoundArguments> {
        if let Some((unknown, _)) = args
            .iter()
            .find(|(name, _)| !self.params.iter().any(|p| p.name == *name))
        {
            return Err(Error::Binding(format!("unexpected argument '{unknown}'")));
        }

        let mut pairs = Vec::with_capacity(self.params.len());
        for param in &self.params {
            let value = match (args.get(&param.name), &param.default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(Error::Binding(format!(
                        "missing required argument '{}'",
                        param.name
                    )))
                }
            };
            pairs.push((param.name.clone(), value));
        }
        Ok(BoundArguments { pairs })
    }
}

/// Arguments after binding: the exact input of [`fingerprint`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    pairs: Vec<(String, ArgValue)>,
}

impl BoundArguments {
    /// Remove ignored parameters (e.g. a receiver)
    #[must_use]
    pub fn without<S: AsRef<str>>(mut self, ignored: &[S]) -> Self {
        self.pairs
            .retain(|(name, _)| !ignored.iter().any(|i| i.as_ref() == name));
        self
    }

    /// Parameter names in bound order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.pairs.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Number of bound arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when nothing is bound
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Fixed-length content hash of bound arguments (64 lowercase hex chars).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(hex: &str) -> Self {
        Self(hex.to_string())
    }
}

/// Derive the fingerprint of bound arguments.
///
/// Deterministic for a fixed argument order and fixed values; no side
/// effects.
///
/// # Errors
/// Returns `Serialization` if a value has no stable representation
/// (non-finite floats, column types without a display form)
pub fn fingerprint(args: &BoundArguments) -> Result<Fingerprint> {
    for (_, value) in &args.pairs {
        value.check_representable()?;
    }
    let serialized = serde_json::to_vec(&args.pairs)
        .map_err(|e| Error::Serialization(format!("arguments are not serializable: {e}")))?;
    Ok(Fingerprint(hex::encode(Sha256::digest(&serialized))))
}
