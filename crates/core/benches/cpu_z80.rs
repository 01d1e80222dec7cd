use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emu_core::cpu_z80::{CpuZ80, MemoryZ80};

/// Flat 64KB memory with a small VRAM-upload style loop at 0x0000
struct BenchMemory {
    ram: Vec<u8>,
    port_writes: u64,
}

impl BenchMemory {
    fn new() -> Self {
        let mut ram = vec![0; 0x10000];
        let program: &[u8] = &[
            0x31, 0x00, 0xF0, // LD SP,0xF000
            0x21, 0x00, 0x80, // LD HL,0x8000
            0x06, 0x40, // LD B,0x40
            0x7E, // loop: LD A,(HL)
            0xD3, 0x98, // OUT (0x98),A
            0x23, // INC HL
            0x10, 0xFA, // DJNZ loop
            0xCD, 0x20, 0x00, // CALL 0x0020
            0xC3, 0x03, 0x00, // JP 0x0003
        ];
        ram[..program.len()].copy_from_slice(program);
        // 0x0020: XOR A ; ADD A,0x11 ; RET
        ram[0x20..0x24].copy_from_slice(&[0xAF, 0xC6, 0x11, 0xC9]);
        Self { ram, port_writes: 0 }
    }
}

impl MemoryZ80 for BenchMemory {
    fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.ram[addr as usize] = val;
    }

    fn io_write(&mut self, _port: u8, _val: u8) {
        self.port_writes += 1;
    }
}

fn bench_cpu_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_z80_step");

    group.bench_function("single_instruction", |b| {
        b.iter(|| {
            let mut cpu = CpuZ80::new(BenchMemory::new());
            cpu.step();
            black_box(cpu.sp);
        });
    });

    group.finish();
}

fn bench_cpu_multiple_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("cpu_z80_multiple_steps");

    for step_count in [10, 100, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(step_count),
            step_count,
            |b, &count| {
                b.iter(|| {
                    let mut cpu = CpuZ80::new(BenchMemory::new());
                    for _ in 0..count {
                        cpu.step();
                    }
                    black_box(cpu.cycles);
                });
            },
        );
    }

    group.finish();
}

fn bench_cpu_frame(c: &mut Criterion) {
    // One NTSC frame worth of cycles
    c.bench_function("cpu_z80_frame", |b| {
        let mut cpu = CpuZ80::new(BenchMemory::new());
        b.iter(|| {
            let mut budget: i64 = 59_736;
            while budget > 0 {
                budget -= cpu.step() as i64;
            }
            black_box(cpu.memory.port_writes);
        });
    });
}

criterion_group!(
    benches,
    bench_cpu_step,
    bench_cpu_multiple_steps,
    bench_cpu_frame
);
criterion_main!(benches);
