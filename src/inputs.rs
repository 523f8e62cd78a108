//! Stable/volatile partition of a call's arguments.

use std::sync::Arc;

use fastpath_ast::Value;

use crate::errors::ExecError;

/// Read-only named view of the stable inputs of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StableInputs {
    names: Arc<[String]>,
    values: Vec<Value>,
}

impl StableInputs {
    /// `names` and `values` are paired positionally.
    pub fn new(names: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .and_then(|position| self.values.get(position))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for StableInputs {
    fn from_iter<T: IntoIterator<Item = (S, Value)>>(iter: T) -> Self {
        let (names, values): (Vec<String>, Vec<Value>) = iter
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .unzip();
        Self::new(names.into(), values)
    }
}

/// Positions of the stable and volatile parameters in a routine signature.
#[derive(Debug, Clone)]
pub struct ArgumentSplit {
    routine: String,
    arity: usize,
    stable_names: Arc<[String]>,
    stable_positions: Vec<usize>,
    volatile_names: Vec<String>,
    volatile_positions: Vec<usize>,
}

impl ArgumentSplit {
    /// Parameters keep their signature order in both partitions.
    pub fn new(routine: &str, params: &[String], stable: &[String]) -> Self {
        let mut stable_names = Vec::new();
        let mut stable_positions = Vec::new();
        let mut volatile_names = Vec::new();
        let mut volatile_positions = Vec::new();

        for (position, param) in params.iter().enumerate() {
            if stable.contains(param) {
                stable_names.push(param.clone());
                stable_positions.push(position);
            } else {
                volatile_names.push(param.clone());
                volatile_positions.push(position);
            }
        }

        Self {
            routine: routine.to_string(),
            arity: params.len(),
            stable_names: stable_names.into(),
            stable_positions,
            volatile_names,
            volatile_positions,
        }
    }

    pub fn stable_names(&self) -> &[String] {
        &self.stable_names
    }

    pub fn volatile_names(&self) -> &[String] {
        &self.volatile_names
    }

    pub fn split(&self, args: &[Value]) -> Result<(StableInputs, Vec<Value>), ExecError> {
        if args.len() != self.arity {
            return Err(ExecError::Arity {
                routine: self.routine.clone(),
                expected: self.arity,
                found: args.len(),
            });
        }

        let pick = |positions: &[usize]| -> Vec<Value> {
            positions.iter().map(|&position| args[position].clone()).collect()
        };
        let stable = StableInputs::new(Arc::clone(&self.stable_names), pick(&self.stable_positions));
        Ok((stable, pick(&self.volatile_positions)))
    }
}
