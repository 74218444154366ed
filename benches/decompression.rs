use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::hint::black_box;
use std::io::Write;
use std::time::Duration;
use z64decompress::{
    decompress_file_bytes, decompress_rom, write_be_u32, Codec, NoChecksum, RomOptions,
};

fn generate_data(size: usize, pattern: &str) -> Vec<u8> {
    match pattern {
        "text" => {
            let base = b"Hyrule Field, Lon Lon Ranch, Kakariko Village, Death Mountain. ";
            base.iter().copied().cycle().take(size).collect()
        }
        "binary" => (0..size).map(|i| ((i * 17 + 11) % 256) as u8).collect(),
        "random" => (0..size)
            .map(|i| {
                let x = i as u32;
                (x.wrapping_mul(1664525).wrapping_add(1013904223) >> 16) as u8
            })
            .collect(),
        _ => panic!("Unknown pattern: {}", pattern),
    }
}

/// Greedy Yaz0 encoder with a short search window
fn yaz0_encode(data: &[u8]) -> Vec<u8> {
    const WINDOW: usize = 256;
    let mut out = b"Yaz0".to_vec();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&[0u8; 8]);

    let mut pos = 0;
    while pos < data.len() {
        let control = out.len();
        out.push(0);
        for bit in 0..8 {
            if pos >= data.len() {
                break;
            }
            let (mut best_len, mut best_dist) = (0, 0);
            for dist in 1..=WINDOW.min(pos) {
                let len = (0..0x111.min(data.len() - pos))
                    .take_while(|&i| data[pos + i] == data[pos - dist + i])
                    .count();
                if len > best_len {
                    best_len = len;
                    best_dist = dist;
                }
            }
            if best_len >= 3 {
                let d = best_dist - 1;
                if best_len >= 0x12 {
                    out.push((d >> 8) as u8);
                    out.push(d as u8);
                    out.push((best_len - 0x12) as u8);
                } else {
                    out.push(((best_len - 2) << 4 | d >> 8) as u8);
                    out.push(d as u8);
                }
                pos += best_len;
            } else {
                out[control] |= 0x80 >> bit;
                out.push(data[pos]);
                pos += 1;
            }
        }
    }
    out
}

fn zlib_encode(data: &[u8]) -> Vec<u8> {
    let mut out = b"ZLIB".to_vec();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    let mut encoder = ZlibEncoder::new(out, Compression::best());
    encoder.write_all(data).expect("Compression failed");
    encoder.finish().expect("Compression failed")
}

fn decompression_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompression_throughput");
    group.measurement_time(Duration::from_secs(10));

    for size in [1024, 10240, 102400] {
        let size_label = match size {
            1024 => "1KB",
            10240 => "10KB",
            102400 => "100KB",
            _ => "unknown",
        };

        for pattern in ["text", "binary", "random"] {
            let original = generate_data(size, pattern);
            group.throughput(Throughput::Bytes(size as u64));

            for (codec, file) in [
                (Codec::Yaz0, yaz0_encode(&original)),
                (Codec::Zlib, zlib_encode(&original)),
            ] {
                group.bench_with_input(
                    BenchmarkId::new(codec.name(), format!("{}_{}", size_label, pattern)),
                    &file,
                    |b, file| b.iter(|| decompress_file_bytes(black_box(file), None).unwrap()),
                );
            }
        }
    }

    group.finish();
}

/// ROM with a standard table and `files` Yaz0 files of `size` bytes each
fn generate_rom(files: usize, size: usize) -> Vec<u8> {
    const TABLE: usize = 0x1100;
    let count = 3 + files;
    let file = yaz0_encode(&generate_data(size, "text"));
    let slot = file.len().next_multiple_of(16);
    let mut rom = vec![0u8; 0x4000 + files * slot];

    let mut entry = |index: usize, fields: [u32; 4]| {
        for (i, field) in fields.iter().enumerate() {
            write_be_u32(&mut rom, TABLE + index * 16 + i * 4, *field);
        }
    };
    entry(0, [0, 0x1060, 0, 0]);
    entry(1, [0x1060, TABLE as u32, 0x1060, 0]);
    entry(2, [TABLE as u32, (TABLE + count * 16) as u32, TABLE as u32, 0]);
    for i in 0..files {
        let phys = 0x4000 + i * slot;
        let virt = 0x10_0000 + i * size;
        entry(
            3 + i,
            [
                virt as u32,
                (virt + size) as u32,
                phys as u32,
                (phys + file.len()) as u32,
            ],
        );
    }
    for i in 0..files {
        let phys = 0x4000 + i * slot;
        rom[phys..phys + file.len()].copy_from_slice(&file);
    }
    rom
}

fn rom_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("rom_rebuild");
    group.sample_size(20);

    for files in [16, 128] {
        let rom = generate_rom(files, 8192);
        group.throughput(Throughput::Bytes((files * 8192) as u64));
        group.bench_with_input(BenchmarkId::new("yaz0", files), &rom, |b, rom| {
            b.iter(|| decompress_rom(black_box(rom), &RomOptions::new(), &mut NoChecksum).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, decompression_throughput, rom_rebuild);
criterion_main!(benches);
