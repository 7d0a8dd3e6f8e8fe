//! Instruction encoding micro-benchmark.
//!
//! Measures:
//! - `Instruction::encode` alone (width checks + packing)
//! - A full 1000-instruction session against the simulated driver

use criterion::{Criterion, criterion_group, criterion_main};
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;

use lab_common::parameter::Value;
use lab_instrument::builtin::{PULSE_SEQUENCER, builtin_catalog};
use lab_instrument::device::Device;
use lab_instrument::registry::InstrumentId;
use lab_instrument::sequencer::{Instruction, Opcode, PulseSequencer, PulseShape, Register, SimulatedSequencer};

const SESSION_LEN: u32 = 1000;

fn bench_encode(c: &mut Criterion) {
    let instruction = Instruction::new(Opcode::LongDelay, 0x15_5555, PulseShape::ThreePeriod, 40_000, 1 << 19);
    c.bench_function("instruction_encode", |b| {
        b.iter(|| black_box(instruction).encode());
    });
}

fn bench_session(c: &mut Criterion) {
    let definition = match builtin_catalog().and_then(|cat| cat.definition(PULSE_SEQUENCER)) {
        Ok(d) => Arc::new(d),
        Err(e) => panic!("built-in catalog: {e}"),
    };
    let supplied = BTreeMap::from([
        ("board_num".to_string(), Value::Int(0)),
        ("clock_mhz".to_string(), Value::Float(500.0)),
    ]);
    let mut sequencer = match PulseSequencer::new(
        InstrumentId::new(0),
        "bench",
        definition,
        supplied,
        SimulatedSequencer::default(),
    ) {
        Ok(s) => s,
        Err(e) => panic!("sequencer: {e}"),
    };
    if let Err(e) = sequencer.connect() {
        panic!("connect: {e}");
    }

    c.bench_function("session_1000_instructions", |b| {
        b.iter(|| {
            let _ = sequencer.start_programming(Register::PulseProgram);
            for i in 0..SESSION_LEN {
                let _ = sequencer.continue_inst(black_box(i & 0x1F_FFFF), PulseShape::On, 12);
            }
            let _ = sequencer.stop_inst(0, PulseShape::Off, 12);
            let _ = sequencer.stop_programming();
            sequencer.driver_mut().clear_calls();
        });
    });
}

criterion_group!(benches, bench_encode, bench_session);
criterion_main!(benches);
