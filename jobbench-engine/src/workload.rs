use std::collections::BTreeMap;

use jobbench_core::DEFAULT_PROCESS_DEFINITION_KEY;

/// Async service steps of the benchmark definition.
pub const BENCHMARK_ASYNC_STEPS: u32 = 27;

pub type Variables = BTreeMap<String, i64>;

/// Service task body. Receives the zero-based step index and the instance variables.
pub type Delegate = fn(step: u32, vars: &mut Variables) -> Result<(), String>;

/// Linear process: start event, `async_steps` asynchronous service tasks, end event.
#[derive(Debug, Clone)]
pub struct ProcessDefinition {
    key: String,
    async_steps: u32,
    delegate: Delegate,
}

impl ProcessDefinition {
    pub fn new(key: impl Into<String>, async_steps: u32, delegate: Delegate) -> Self {
        Self {
            key: key.into(),
            async_steps,
            delegate,
        }
    }

    /// The `AsyncProcess` workload.
    pub fn benchmark() -> Self {
        Self::new(DEFAULT_PROCESS_DEFINITION_KEY, BENCHMARK_ASYNC_STEPS, sum_inputs)
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn async_steps(&self) -> u32 {
        self.async_steps
    }

    /// Activities recorded in history by one completed instance.
    #[must_use]
    pub fn activities_per_instance(&self) -> u64 {
        u64::from(self.async_steps) + 2
    }

    pub(crate) fn run_step(&self, step: u32, vars: &mut Variables) -> Result<(), String> {
        (self.delegate)(step, vars)
    }
}

/// Stores `input1 + input2` into `result_<step>`.
pub fn sum_inputs(step: u32, vars: &mut Variables) -> Result<(), String> {
    let a = vars.get("input1").copied().ok_or("missing variable `input1`")?;
    let b = vars.get("input2").copied().ok_or("missing variable `input2`")?;
    vars.insert(format!("result_{}", step + 1), a + b);
    Ok(())
}
