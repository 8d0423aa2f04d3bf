use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, ExecutionResult};

pub trait IdValueType: Sized {
    fn first() -> Self;
    fn next(v: Self) -> ExecutionResult<Self>;
}

impl IdValueType for u64 {
    fn first() -> Self {
        1
    }

    fn next(v: Self) -> ExecutionResult<Self> {
        v.checked_add(1)
            .ok_or(ExecutionError::internal("ID overflow"))
    }
}

pub trait IdType: Sized {
    type Value: IdValueType + From<Self> + Into<Self>;
}

macro_rules! define_id_type {
    ($name:ident, $value_type:ty) => {
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        pub struct $name($value_type);

        impl IdType for $name {
            type Value = $value_type;
        }

        impl From<$value_type> for $name {
            fn from(id: $value_type) -> Self {
                Self(id)
            }
        }

        impl From<$name> for $value_type {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// One attempt to run a task on a worker.
define_id_type!(DispatchId, u64);

#[derive(Debug)]
pub struct IdGenerator<T: IdType> {
    next_value: T::Value,
    phantom: PhantomData<T>,
}

impl<T: IdType> Default for IdGenerator<T>
where
    T::Value: Copy,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdType> IdGenerator<T>
where
    T::Value: Copy,
{
    pub fn new() -> Self {
        Self {
            next_value: T::Value::first(),
            phantom: PhantomData,
        }
    }

    pub fn next(&mut self) -> ExecutionResult<T> {
        let value = self.next_value;
        self.next_value = T::Value::next(value)?;
        Ok(value.into())
    }
}

macro_rules! define_name_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(name)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_name_type!(WorkerName);
define_name_type!(SessionName);
define_name_type!(ExecutionName);
define_name_type!(TaskName);

/// Generates names in the form of `{prefix}{millis}-{sequence}`.
/// The sequence keeps names unique when many are created within one millisecond.
#[derive(Debug, Default)]
pub struct NameGenerator {
    sequence: u64,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next<T: From<String>>(&mut self, prefix: &str) -> T {
        self.sequence = self.sequence.wrapping_add(1);
        let millis = chrono::Utc::now().timestamp_millis();
        format!("{prefix}{millis}-{}", self.sequence).into()
    }
}
