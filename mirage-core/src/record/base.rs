//! Base implementation of records for logging.
use crate::error::MirageError;
use std::collections::{hash_map::Iter, HashMap};

/// Represents possible types of values that can be stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single floating-point value, typically a loss or an episode statistic.
    Scalar(f32),

    /// A 2-dimensional array with shape information, written as a gray image
    /// by recorders that support images.
    Array2(Vec<f32>, [usize; 2]),
}

/// A container for storing key-value pairs of various data types.
///
/// Environments return their per-step information as a [`Record`], and the
/// driver and the coordinator emit their summaries as records as well.
///
/// ```rust
/// use mirage_core::record::{Record, RecordValue};
///
/// let mut record = Record::from_scalar("model/policy_loss", 0.5);
/// record.insert("model/entropy", RecordValue::Scalar(1.2));
/// assert_eq!(record.get_scalar("model/policy_loss").unwrap(), 0.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Inserts a key-value pair into the record.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over the key-value pairs in the record.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Gets a reference to the value associated with the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Gets a scalar value from the record.
    pub fn get_scalar(&self, k: &str) -> Result<f32, MirageError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(MirageError::RecordValueTypeError("Scalar".to_string())),
            None => Err(MirageError::RecordKeyError(k.to_string())),
        }
    }

    /// Gets a 2-dimensional array and its shape from the record.
    pub fn get_array2(&self, k: &str) -> Result<(Vec<f32>, [usize; 2]), MirageError> {
        match self.0.get(k) {
            Some(RecordValue::Array2(v, s)) => Ok((v.clone(), *s)),
            Some(_) => Err(MirageError::RecordValueTypeError("Array2".to_string())),
            None => Err(MirageError::RecordKeyError(k.to_string())),
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Checks if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
