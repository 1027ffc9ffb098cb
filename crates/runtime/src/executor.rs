//! Iteration executor.
//!
//! Stack-based VM that runs a [`CompiledCode`] program for one iteration.
//! The compiler guarantees a balanced stream, so stack discipline is guarded
//! with assertions; only value-level failures (complex quantization, complex
//! ordering, custom-op errors) surface as [`ExecutionError`].

use ripple_graph::Number;

use crate::instruction::{quantization_mask, InstructionKind};
use crate::program::CompiledCode;

/// Result of one simulation iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    /// The program's output values, in output order.
    pub stack: Vec<Number>,
    /// Last value written to each result slot this iteration.
    pub results: Vec<Number>,
}

/// Runtime execution errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    /// A complex value reached a quantization point.
    #[error("complex value {value} cannot be quantized")]
    ComplexQuantize { value: Number },

    /// `min`/`max` received a complex operand.
    #[error("min/max does not support complex operands")]
    ComplexOrder,

    /// The global bit-width override exceeds 64 bits.
    #[error("cannot quantize to more than 64 bits (got {bits})")]
    QuantizationTooWide { bits: u8 },

    /// A host-defined operation reported a failure.
    #[error("custom operation failed: {message}")]
    CustomOpFailed { message: String },
}

/// Execute one iteration of a compiled program.
///
/// `delays` holds the delay registers; their pre-iteration values are read by
/// `PushDelay` and each register is overwritten by its `UpdateDelay` before
/// the call returns. With `quantize` set and a `bits_override`, every
/// instruction's result is masked to the override width and the program's own
/// `Quantize` instructions are bypassed.
///
/// # Errors
///
/// Returns an [`ExecutionError`] when a quantization point sees a complex
/// value, `min`/`max` sees a complex operand, the override width exceeds 64
/// bits, or a custom operation fails.
pub fn run_iteration(
    code: &CompiledCode,
    inputs: &[Number],
    delays: &mut [Number],
    bits_override: Option<u8>,
    quantize: bool,
) -> Result<SimulationState, ExecutionError> {
    debug_assert_eq!(inputs.len(), code.input_count);
    debug_assert_eq!(delays.len(), code.delays.len());
    debug_assert!(code.output_count <= code.required_stack_size || code.output_count == 0);

    // The override mask replaces the program's own quantization points.
    let override_mask = match bits_override {
        Some(bits) if quantize => {
            if bits > 64 {
                return Err(ExecutionError::QuantizationTooWide { bits });
            }
            Some(quantization_mask(bits))
        }
        _ => None,
    };
    let effective_quantize = quantize && override_mask.is_none();

    // One slot past the result keys absorbs ignored writes.
    let mut results = vec![Number::ZERO; code.result_keys.len() + 1];
    for (register, delay) in delays.iter().zip(&code.delays) {
        results[delay.result_index as usize] = *register;
    }

    let mut stack: Vec<Number> = Vec::with_capacity(code.required_stack_size);

    for instruction in &code.instructions {
        match instruction.kind {
            InstructionKind::PushInput(index) => stack.push(inputs[index]),
            InstructionKind::PushResult(index) => stack.push(results[index]),
            InstructionKind::PushDelay(index) => stack.push(delays[index]),
            InstructionKind::PushConstant(value) => stack.push(value),
            InstructionKind::Quantize(mask) => {
                if override_mask.is_none() {
                    let value = pop(&mut stack);
                    stack.push(quantize_value(value, mask)?);
                }
            }
            InstructionKind::Add => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                stack.push(lhs + rhs);
            }
            InstructionKind::Sub => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                stack.push(lhs - rhs);
            }
            InstructionKind::Mul => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                stack.push(lhs * rhs);
            }
            InstructionKind::Div => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                stack.push(lhs / rhs);
            }
            InstructionKind::Min => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                if !lhs.is_real() || !rhs.is_real() {
                    return Err(ExecutionError::ComplexOrder);
                }
                stack.push(Number::real(lhs.real.min(rhs.real)));
            }
            InstructionKind::Max => {
                let rhs = pop(&mut stack);
                let lhs = pop(&mut stack);
                if !lhs.is_real() || !rhs.is_real() {
                    return Err(ExecutionError::ComplexOrder);
                }
                stack.push(Number::real(lhs.real.max(rhs.real)));
            }
            InstructionKind::Sqrt => {
                let value = pop(&mut stack);
                stack.push(value.sqrt());
            }
            InstructionKind::Conj => {
                let value = pop(&mut stack);
                stack.push(value.conj());
            }
            InstructionKind::Abs => {
                let value = pop(&mut stack);
                stack.push(value.abs());
            }
            InstructionKind::ConstMul(coefficient) => {
                let value = pop(&mut stack);
                stack.push(value * coefficient);
            }
            InstructionKind::UpdateDelay(index) => {
                delays[index] = pop(&mut stack);
            }
            InstructionKind::Custom(source_index) => {
                let source = &code.custom_sources[source_index];
                let op = &code.custom_operations[source.custom_operation_index];
                // Inputs arrive in pop order: values[0] was the top of stack.
                let mut values = Vec::with_capacity(op.input_count);
                for _ in 0..op.input_count {
                    values.push(pop(&mut stack));
                }
                let value = (op.evaluate)(source.output_index, &values, effective_quantize)
                    .map_err(|message| ExecutionError::CustomOpFailed { message })?;
                stack.push(value);
            }
            InstructionKind::ForwardValue => {}
        }

        if let Some(mask) = override_mask {
            if let Some(top) = stack.last_mut() {
                *top = quantize_value(*top, mask)?;
            }
        }

        if let Some(top) = stack.last() {
            results[instruction.result_index as usize] = *top;
        }
    }

    debug_assert!(
        stack.len() <= code.required_stack_size,
        "vm bug: stack overflow"
    );
    debug_assert_eq!(stack.len(), code.output_count, "vm bug: unbalanced stream");

    // Drop the ignored-sink slot; keep only the output prefix of the stack.
    results.pop();
    stack.truncate(code.output_count);

    Ok(SimulationState { stack, results })
}

fn pop(stack: &mut Vec<Number>) -> Number {
    stack.pop().expect("vm bug: stack underflow")
}

/// Mask the integer reinterpretation of a real value, modeling fixed-point
/// wrap-around at the mask's width.
fn quantize_value(value: Number, mask: u64) -> Result<Number, ExecutionError> {
    if !value.is_real() {
        return Err(ExecutionError::ComplexQuantize { value });
    }
    Ok(Number::real(((value.real as i64) & (mask as i64)) as f64))
}
