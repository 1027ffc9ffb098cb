use std::rc::Rc;

use ripple_graph::{CustomOp, Number, SfgBuilder};

use super::{compile, CompileError};
use crate::instruction::{Instruction, InstructionKind};

use InstructionKind::*;

fn instr(kind: InstructionKind, result_index: u16) -> Instruction {
    Instruction { kind, result_index }
}

#[test]
fn test_combinational_add_program() {
    let mut b = SfgBuilder::new();
    let x = b.input();
    let y = b.input();
    let sum = b.add(x, y);
    b.output(sum);
    let code = compile(&b.build().unwrap()).unwrap();

    assert_eq!(code.input_count, 2);
    assert_eq!(code.output_count, 1);
    assert_eq!(code.required_stack_size, 2);
    assert_eq!(code.result_keys, ["0", "add1", "in1", "in2"]);
    assert_eq!(
        code.instructions,
        [
            instr(PushInput(0), 2),
            instr(PushInput(1), 3),
            instr(Add, 1),
            instr(ForwardValue, 0),
        ]
    );
}

#[test]
fn test_operand_order_is_emission_order() {
    // lhs is emitted first and ends up below rhs on the stack.
    let mut b = SfgBuilder::new();
    let lhs = b.constant(10.0);
    let rhs = b.constant(4.0);
    let diff = b.sub(lhs, rhs);
    b.output(diff);
    let code = compile(&b.build().unwrap()).unwrap();

    assert_eq!(
        code.instructions,
        [
            instr(PushConstant(Number::real(10.0)), 2),
            instr(PushConstant(Number::real(4.0)), 3),
            instr(Sub, 1),
            instr(ForwardValue, 0),
        ]
    );
}

#[test]
fn test_shared_output_emitted_once() {
    // One constant feeding two consumers: a single body emission, then a
    // PushResult re-use referring to the first result slot.
    let mut b = SfgBuilder::new();
    let c = b.constant(2.0);
    let s = b.sqrt(c);
    let j = b.conj(c);
    b.output(s);
    b.output(j);
    let code = compile(&b.build().unwrap()).unwrap();

    assert_eq!(code.result_keys, ["0", "sqrt1", "c1", "1", "conj1"]);
    assert_eq!(
        code.instructions,
        [
            instr(PushConstant(Number::real(2.0)), 2),
            instr(Sqrt, 1),
            instr(ForwardValue, 0),
            instr(PushResult(2), 2),
            instr(Conj, 4),
            instr(ForwardValue, 3),
        ]
    );
}

#[test]
fn test_butterfly_program() {
    let mut b = SfgBuilder::new();
    let c1 = b.constant(3.0);
    let c2 = b.constant(4.0);
    let (lo, hi) = b.butterfly(c1, c2);
    b.output(lo);
    b.output(hi);
    let code = compile(&b.build().unwrap()).unwrap();

    assert_eq!(code.output_count, 2);
    assert_eq!(code.required_stack_size, 3);
    assert_eq!(
        code.result_keys,
        ["0", "bfly1.0", "c1", "c2", "1", "bfly1.1"]
    );
    assert_eq!(
        code.instructions,
        [
            instr(PushConstant(Number::real(3.0)), 2),
            instr(PushConstant(Number::real(4.0)), 3),
            instr(Add, 1),
            instr(ForwardValue, 0),
            instr(PushResult(2), 2),
            instr(PushResult(3), 3),
            instr(Sub, 5),
            instr(ForwardValue, 4),
        ]
    );
}

#[test]
fn test_delay_update_is_deferred() {
    // Accumulator: the delay read happens in the forward pass, the register
    // write-back comes after all outputs, targeting the ignored sink.
    let mut b = SfgBuilder::new();
    let x = b.input();
    let t = b.delay(0.0);
    let sum = b.add(x, t);
    b.connect(sum, t.node, 0);
    b.output(sum);
    let code = compile(&b.build().unwrap()).unwrap();

    assert_eq!(code.result_keys, ["0", "add1", "in1", "t1"]);
    assert_eq!(code.delays.len(), 1);
    assert_eq!(code.delays[0].initial_value, Number::ZERO);
    assert_eq!(code.delays[0].result_index, 3);
    assert_eq!(
        code.instructions,
        [
            instr(PushInput(0), 2),
            instr(PushDelay(0), 3),
            instr(Add, 1),
            instr(ForwardValue, 0),
            instr(PushResult(1), 1),
            instr(UpdateDelay(0), 4),
        ]
    );
}

#[test]
fn test_delay_chain_reached_from_deferred_update() {
    // t1 feeds the output; t2 only feeds t1's input, so it is first reached
    // while draining the deferred queue and must enqueue its own update.
    let mut b = SfgBuilder::new();
    let x = b.input();
    let t2 = b.delay(0.0);
    b.connect(x, t2.node, 0);
    let t1 = b.delay(0.0);
    b.connect(t2, t1.node, 0);
    b.output(t1);
    let code = compile(&b.build().unwrap()).unwrap();

    assert_eq!(code.delays.len(), 2);
    let updates: Vec<_> = code
        .instructions
        .iter()
        .filter(|i| matches!(i.kind, UpdateDelay(_)))
        .collect();
    assert_eq!(updates.len(), 2);
    // Exactly output_count values survive the stream.
    let depth: isize = code
        .instructions
        .iter()
        .map(|i| match i.kind {
            PushInput(_) | PushResult(_) | PushDelay(_) | PushConstant(_) => 1,
            Add | Sub | Mul | Div | Min | Max | UpdateDelay(_) => -1,
            Custom(_) => unreachable!(),
            _ => 0,
        })
        .sum();
    assert_eq!(depth as usize, code.output_count);
}

#[test]
fn test_direct_feedback_loop_is_rejected() {
    let mut b = SfgBuilder::new();
    let x = b.input();
    let sum = b.add(x, x);
    b.connect(sum, sum.node, 1);
    b.output(sum);
    let err = compile(&b.build().unwrap()).unwrap_err();
    assert_eq!(err, CompileError::DirectFeedbackLoop);
}

#[test]
fn test_nested_sfg_forwarding_and_keys() {
    let mut inner = SfgBuilder::new();
    let ix = inner.input();
    let scaled = inner.const_mul(2.0, ix);
    inner.output(scaled);
    let inner = inner.build().unwrap();

    let mut b = SfgBuilder::new();
    let x = b.input();
    let outs = b.subgraph(inner, &[x]);
    b.output(outs[0]);
    let code = compile(&b.build().unwrap()).unwrap();

    assert_eq!(
        code.result_keys,
        ["0", "sfg1", "sfg1.cmul1", "sfg1.in1", "in1"]
    );
    assert_eq!(
        code.instructions,
        [
            instr(PushInput(0), 4),
            instr(ForwardValue, 3),
            instr(ConstMul(Number::real(2.0)), 2),
            instr(ForwardValue, 1),
            instr(ForwardValue, 0),
        ]
    );
}

#[test]
fn test_nested_sfg_multi_output_keys() {
    let mut inner = SfgBuilder::new();
    let a = inner.input();
    let c = inner.input();
    let (lo, hi) = inner.butterfly(a, c);
    inner.output(lo);
    inner.output(hi);
    let inner = inner.build().unwrap();

    let mut b = SfgBuilder::new();
    let x = b.input();
    let y = b.input();
    let outs = b.subgraph(inner, &[x, y]);
    b.output(outs[0]);
    b.output(outs[1]);
    let code = compile(&b.build().unwrap()).unwrap();

    // The subgraph node has two outputs, so its keys carry output indices.
    assert!(code.result_keys.contains(&"sfg1.0".to_string()));
    assert!(code.result_keys.contains(&"sfg1.1".to_string()));
    assert!(code.result_keys.contains(&"sfg1.bfly1.0".to_string()));
    assert!(code.result_keys.contains(&"sfg1.bfly1.1".to_string()));
}

#[test]
fn test_quantized_edge_emits_mask() {
    let mut b = SfgBuilder::new();
    let x = b.input();
    let y = b.sqrt(x.quantized(4));
    b.output(y);
    let code = compile(&b.build().unwrap()).unwrap();

    let sink = code.result_keys.len() as u16;
    assert_eq!(
        code.instructions,
        [
            instr(PushInput(0), 2),
            instr(Quantize(0xF), sink),
            instr(Sqrt, 1),
            instr(ForwardValue, 0),
        ]
    );
}

#[test]
fn test_zero_width_edge_is_not_quantized() {
    let mut b = SfgBuilder::new();
    let x = b.input();
    let y = b.sqrt(x.quantized(0));
    b.output(y);
    let code = compile(&b.build().unwrap()).unwrap();
    assert!(!code
        .instructions
        .iter()
        .any(|i| matches!(i.kind, Quantize(_))));
}

#[test]
fn test_quantization_wider_than_64_bits_is_rejected() {
    let mut b = SfgBuilder::new();
    let x = b.input();
    let y = b.sqrt(x.quantized(65));
    b.output(y);
    let err = compile(&b.build().unwrap()).unwrap_err();
    assert_eq!(err, CompileError::QuantizationTooWide { bits: 65 });
}

#[test]
fn test_custom_operation_tables() {
    let op = CustomOp {
        name: "swap".into(),
        input_count: 2,
        output_count: 2,
        evaluate: Rc::new(|output, values, _quantize| Ok(values[output])),
    };

    let mut b = SfgBuilder::new();
    let x = b.input();
    let y = b.input();
    let outs = b.custom(op, &[x, y]);
    b.output(outs[0]);
    b.output(outs[1]);
    let code = compile(&b.build().unwrap()).unwrap();

    // One interned operation, one custom source per consumed output.
    assert_eq!(code.custom_operations.len(), 1);
    assert_eq!(code.custom_sources.len(), 2);
    assert_eq!(code.custom_sources[0].custom_operation_index, 0);
    assert_eq!(code.custom_sources[0].output_index, 0);
    assert_eq!(code.custom_sources[1].output_index, 1);
    let customs = code
        .instructions
        .iter()
        .filter(|i| matches!(i.kind, Custom(_)))
        .count();
    assert_eq!(customs, 2);
}

#[test]
fn test_compilation_is_deterministic() {
    let mut b = SfgBuilder::new();
    let x = b.input();
    let t = b.delay(1.0);
    let sum = b.add(x, t);
    b.connect(sum, t.node, 0);
    let (lo, hi) = b.butterfly(sum, t);
    b.output(lo);
    b.output(hi);
    let sfg = b.build().unwrap();

    assert_eq!(compile(&sfg).unwrap(), compile(&sfg).unwrap());
}

#[test]
fn test_too_many_results_is_rejected() {
    let mut b = SfgBuilder::new();
    // Each output contributes two result slots (its own key and the
    // constant's), overflowing the u16 result-index space.
    for _ in 0..40_000 {
        let c = b.constant(1.0);
        b.output(c);
    }
    let err = compile(&b.build().unwrap()).unwrap_err();
    assert!(matches!(err, CompileError::TooManyResults { .. }));
}
