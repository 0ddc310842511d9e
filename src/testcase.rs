//! Test cases: bounded sequences of input vectors driving an analysis.
//!
//! Every input is either a definite Boolean or [`InputValue::Free`]. Test cases come from
//! aigsim-style stimulus files (one line per step, `0`, `1` or `?` per input), are generated
//! at random, or leave every input free for a model-checking style search.

use std::{
    fmt,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

use rand::{Rng, seq::index};
use thiserror::Error;

use crate::{cnf::Lit, solver::Model};

/// Error returned when a test case is malformed.
#[derive(Debug, Error)]
pub enum TestCaseError {
    /// A step does not have one value per circuit input.
    #[error("step {step} has {found} input values, expected {expected}")]
    WidthMismatch {
        step: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid input value {found:?} at step {step}")]
    InvalidCharacter { step: usize, found: char },

    #[error("io error on {}: {message}", path.display())]
    IoError { path: PathBuf, message: String },

    /// A stimulus file could not be parsed.
    #[error("corrupt test case file {}: {source}", path.display())]
    CorruptFile {
        path: PathBuf,
        #[source]
        source: Box<TestCaseError>,
    },
}

/// Value of one input at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputValue {
    False,
    True,
    /// Unconstrained, realised as a fresh variable by the symbolic simulators.
    Free,
}

impl InputValue {
    pub fn is_free(self) -> bool {
        self == InputValue::Free
    }

    /// The definite value, `None` if free.
    pub fn to_bool(self) -> Option<bool> {
        match self {
            InputValue::False => Some(false),
            InputValue::True => Some(true),
            InputValue::Free => None,
        }
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        if value {
            InputValue::True
        } else {
            InputValue::False
        }
    }
}

impl TryFrom<char> for InputValue {
    type Error = char;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            '0' => Ok(InputValue::False),
            '1' => Ok(InputValue::True),
            '?' => Ok(InputValue::Free),
            _ => Err(c),
        }
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            InputValue::False => '0',
            InputValue::True => '1',
            InputValue::Free => '?',
        };
        write!(f, "{}", c)
    }
}

/// A sequence of input vectors, all of the same width.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestCase {
    num_inputs: usize,
    steps: Vec<Vec<InputValue>>,
}

impl TestCase {
    /// Checks that every step has exactly `num_inputs` values.
    pub fn new(num_inputs: usize, steps: Vec<Vec<InputValue>>) -> Result<Self, TestCaseError> {
        for (step, values) in steps.iter().enumerate() {
            if values.len() != num_inputs {
                return Err(TestCaseError::WidthMismatch {
                    step,
                    expected: num_inputs,
                    found: values.len(),
                });
            }
        }
        Ok(TestCase { num_inputs, steps })
    }

    /// A test case without free inputs.
    pub fn from_bools(num_inputs: usize, steps: &[Vec<bool>]) -> Result<Self, TestCaseError> {
        let steps = steps
            .iter()
            .map(|s| s.iter().map(|&b| InputValue::from(b)).collect())
            .collect();
        TestCase::new(num_inputs, steps)
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Vec<InputValue>] {
        &self.steps
    }

    pub fn step(&self, t: usize) -> &[InputValue] {
        &self.steps[t]
    }

    pub fn has_free_inputs(&self) -> bool {
        self.steps.iter().flatten().any(|v| v.is_free())
    }

    /// The first `len` steps.
    pub fn prefix(&self, len: usize) -> TestCase {
        TestCase {
            num_inputs: self.num_inputs,
            steps: self.steps[..len.min(self.steps.len())].to_vec(),
        }
    }

    /// The definite values of a step, free inputs read as false.
    pub fn bools(&self, t: usize) -> Vec<bool> {
        self.steps[t]
            .iter()
            .map(|v| v.to_bool().unwrap_or(false))
            .collect()
    }

    /// Replaces the free inputs by their value in `model`.
    ///
    /// `cnf_inputs[t][i]` is the literal that stood for input `i` at step `t` during the
    /// symbolic run; inputs missing from the model become false.
    pub fn concretize(&self, cnf_inputs: &[Vec<Lit>], model: &Model) -> TestCase {
        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(t, values)| {
                values
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| match v {
                        InputValue::Free => cnf_inputs
                            .get(t)
                            .and_then(|step| step.get(i))
                            .and_then(|&lit| model.value(lit))
                            .unwrap_or(false)
                            .into(),
                        definite => definite,
                    })
                    .collect()
            })
            .collect();
        TestCase {
            num_inputs: self.num_inputs,
            steps,
        }
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            for v in step {
                write!(f, "{}", v)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Parses an aigsim stimulus: one line per step, one character per input.
///
/// Empty lines are ignored.
pub fn parse_aigsim(reader: impl Read, num_inputs: usize) -> Result<TestCase, TestCaseError> {
    let mut steps = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line.map_err(|e| TestCaseError::IoError {
            path: PathBuf::new(),
            message: e.to_string(),
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let step = steps.len();
        let values = line
            .chars()
            .map(|c| {
                InputValue::try_from(c)
                    .map_err(|found| TestCaseError::InvalidCharacter { step, found })
            })
            .collect::<Result<Vec<_>, _>>()?;
        steps.push(values);
    }
    TestCase::new(num_inputs, steps)
}

/// Reads an aigsim stimulus file, errors carry the path.
pub fn read_aigsim_file(
    path: impl AsRef<Path>,
    num_inputs: usize,
) -> Result<TestCase, TestCaseError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| TestCaseError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_aigsim(file, num_inputs).map_err(|e| TestCaseError::CorruptFile {
        path: path.to_path_buf(),
        source: Box::new(e),
    })
}

/// `n` random test cases of `len` steps.
///
/// In each test case, `num_free_inputs` randomly chosen input positions are free at
/// every step, the other inputs get random definite values.
pub fn random_test_cases<R: Rng>(
    n: usize,
    len: usize,
    num_inputs: usize,
    num_free_inputs: usize,
    rng: &mut R,
) -> Vec<TestCase> {
    (0..n)
        .map(|_| {
            let free = index::sample(rng, num_inputs, num_free_inputs.min(num_inputs));
            let mut is_free = vec![false; num_inputs];
            for i in free.iter() {
                is_free[i] = true;
            }
            let steps = (0..len)
                .map(|_| {
                    (0..num_inputs)
                        .map(|i| {
                            if is_free[i] {
                                InputValue::Free
                            } else {
                                InputValue::from(rng.gen_bool(0.5))
                            }
                        })
                        .collect()
                })
                .collect();
            TestCase { num_inputs, steps }
        })
        .collect()
}

/// A single test case of `len` steps where every input is free.
pub fn model_checking_test_case(len: usize, num_inputs: usize) -> TestCase {
    TestCase {
        num_inputs,
        steps: vec![vec![InputValue::Free; num_inputs]; len],
    }
}
