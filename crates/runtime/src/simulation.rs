//! Simulation driver.
//!
//! [`Simulation`] owns the mutable state of a running simulation: the delay
//! registers, the per-input providers, the iteration counter, and the saved
//! result snapshots. Each `step`/`run_*` call gathers inputs, executes the
//! compiled program for one or more iterations, and advances time.

use indexmap::IndexMap;
use ripple_graph::{Number, Sfg};
use tracing::{info, trace};

use crate::error::{Error, Result};
use crate::executor::run_iteration;
use crate::program::{CompiledCode, ResultKey};

/// Function producing one input value per iteration.
pub type InputFn = Box<dyn Fn(u32) -> Number>;

/// Source of values for one simulation input.
///
/// A `Sequence` provider fixes the simulation's input length; every sequence
/// bound to the same simulation must have the same length. Running a sequence
/// provider past its length panics, so drive such simulations with
/// [`Simulation::run`] or an explicit bound.
pub enum InputProvider {
    /// The same value every iteration.
    Constant(Number),
    /// One value per iteration, indexed by iteration number.
    Sequence(Vec<Number>),
    /// Arbitrary function of the iteration number.
    Function(InputFn),
}

impl InputProvider {
    /// Provider backed by a closure.
    pub fn from_fn(f: impl Fn(u32) -> Number + 'static) -> Self {
        InputProvider::Function(Box::new(f))
    }
}

impl From<Number> for InputProvider {
    fn from(value: Number) -> Self {
        InputProvider::Constant(value)
    }
}

impl From<f64> for InputProvider {
    fn from(value: f64) -> Self {
        InputProvider::Constant(Number::real(value))
    }
}

impl From<Vec<Number>> for InputProvider {
    fn from(values: Vec<Number>) -> Self {
        InputProvider::Sequence(values)
    }
}

impl From<Vec<f64>> for InputProvider {
    fn from(values: Vec<f64>) -> Self {
        InputProvider::Sequence(values.into_iter().map(Number::real).collect())
    }
}

/// A simulation of a compiled signal-flow graph.
pub struct Simulation {
    code: CompiledCode,
    delays: Vec<Number>,
    input_functions: Vec<InputFn>,
    input_length: Option<u32>,
    iteration: u32,
    results: Vec<Vec<Number>>,
}

impl Simulation {
    /// Compile `sfg` and create a simulation for it. All inputs default to
    /// constant zero.
    pub fn new(sfg: &Sfg) -> Result<Self> {
        let code = crate::compiler::compile(sfg)?;
        Ok(Self::from_code(code))
    }

    /// Compile `sfg` and bind initial input providers in one call.
    pub fn with_inputs(sfg: &Sfg, providers: Vec<Option<InputProvider>>) -> Result<Self> {
        let mut simulation = Self::new(sfg)?;
        simulation.set_inputs(providers)?;
        Ok(simulation)
    }

    /// Create a simulation for an already compiled program.
    pub fn from_code(code: CompiledCode) -> Self {
        info!(
            inputs = code.input_count,
            outputs = code.output_count,
            delays = code.delays.len(),
            "simulation created"
        );
        let delays = code.delays.iter().map(|d| d.initial_value).collect();
        let input_functions = (0..code.input_count)
            .map(|_| Box::new(|_| Number::ZERO) as InputFn)
            .collect();
        Self {
            code,
            delays,
            input_functions,
            input_length: None,
            iteration: 0,
            results: Vec::new(),
        }
    }

    /// The compiled program this simulation executes.
    pub fn code(&self) -> &CompiledCode {
        &self.code
    }

    /// Current iteration number; the next `step` executes this iteration.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Bind a provider to input `index`.
    pub fn set_input(&mut self, index: usize, provider: impl Into<InputProvider>) -> Result<()> {
        let count = self.input_functions.len();
        if index >= count {
            return Err(Error::InputIndexOutOfRange { index, count });
        }
        match provider.into() {
            InputProvider::Function(function) => {
                self.input_functions[index] = function;
            }
            InputProvider::Constant(value) => {
                self.input_functions[index] = Box::new(move |_| value);
            }
            InputProvider::Sequence(values) => {
                let length = values.len() as u32;
                match self.input_length {
                    None => self.input_length = Some(length),
                    Some(expected) if expected != length => {
                        return Err(Error::InconsistentInputLength {
                            expected,
                            actual: length,
                        });
                    }
                    Some(_) => {}
                }
                self.input_functions[index] = Box::new(move |n| values[n as usize]);
            }
        }
        Ok(())
    }

    /// Bind providers for all inputs at once; `None` entries keep whatever
    /// was bound before.
    pub fn set_inputs(&mut self, providers: Vec<Option<InputProvider>>) -> Result<()> {
        if providers.len() != self.input_functions.len() {
            return Err(Error::WrongInputCount {
                expected: self.input_functions.len(),
                actual: providers.len(),
            });
        }
        for (index, provider) in providers.into_iter().enumerate() {
            if let Some(provider) = provider {
                self.set_input(index, provider)?;
            }
        }
        Ok(())
    }

    /// Run one iteration and return its output values.
    pub fn step(
        &mut self,
        save_results: bool,
        bits_override: Option<u8>,
        quantize: bool,
    ) -> Result<Vec<Number>> {
        self.run_for(1, save_results, bits_override, quantize)
    }

    /// Run until the iteration counter reaches `iteration` and return the
    /// last iteration's outputs (empty when already there).
    pub fn run_until(
        &mut self,
        iteration: u32,
        save_results: bool,
        bits_override: Option<u8>,
        quantize: bool,
    ) -> Result<Vec<Number>> {
        let mut outputs = Vec::new();
        while self.iteration < iteration {
            trace!(iteration = self.iteration, "running simulation iteration");
            let inputs: Vec<Number> = self
                .input_functions
                .iter()
                .map(|function| function(self.iteration))
                .collect();
            let state =
                run_iteration(&self.code, &inputs, &mut self.delays, bits_override, quantize)?;
            outputs = state.stack;
            if save_results {
                self.results.push(state.results);
            }
            self.iteration += 1;
        }
        Ok(outputs)
    }

    /// Run a given number of iterations.
    pub fn run_for(
        &mut self,
        iterations: u32,
        save_results: bool,
        bits_override: Option<u8>,
        quantize: bool,
    ) -> Result<Vec<Number>> {
        if iterations > u32::MAX - self.iteration {
            return Err(Error::IterationOverflow);
        }
        self.run_until(self.iteration + iterations, save_results, bits_override, quantize)
    }

    /// Run until the end of the bound input sequences.
    pub fn run(
        &mut self,
        save_results: bool,
        bits_override: Option<u8>,
        quantize: bool,
    ) -> Result<Vec<Number>> {
        match self.input_length {
            Some(length) => self.run_until(length, save_results, bits_override, quantize),
            None => Err(Error::UnlimitedRun),
        }
    }

    /// Saved results, column-major: one sequence per result key, covering
    /// every iteration run with `save_results` since the last clear.
    pub fn results(&self) -> IndexMap<ResultKey, Vec<Number>> {
        let mut results = IndexMap::new();
        if self.results.is_empty() {
            return results;
        }
        for (index, key) in self.code.result_keys.iter().enumerate() {
            let values = self.results.iter().map(|snapshot| snapshot[index]).collect();
            results.insert(key.clone(), values);
        }
        results
    }

    /// Discard all saved results.
    pub fn clear_results(&mut self) {
        self.results.clear();
    }

    /// Reset the delay registers to their initial values. The iteration
    /// counter and saved results are left untouched.
    pub fn clear_state(&mut self) {
        for (register, delay) in self.delays.iter_mut().zip(&self.code.delays) {
            *register = delay.initial_value;
        }
    }
}
