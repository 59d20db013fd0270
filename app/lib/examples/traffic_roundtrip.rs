//! Build a batch of test frames, then analyze them as a receiver would.
//!
//! Each frame carries an IPv4/UDP header, a signature and a PRBS payload.
//! Run with: cargo run --example traffic_roundtrip --release
//!
//! Set PKTGEN_KERNELS_DEBUG=1 to see every candidate's timing.

use pktgen_kernels::kernels::signature::{FLAG_PRBS, SIGNATURE_LEN};
use pktgen_kernels::{batch, Signature};
use std::io;
use std::time::Instant;

const FRAMES: usize = 1024;
const FRAME_LEN: usize = 512;
const IP_HEADER: usize = 20;
const UDP_HEADER: usize = 8;
const SIGNATURE_AT: usize = IP_HEADER + UDP_HEADER;
const PAYLOAD_AT: usize = SIGNATURE_AT + SIGNATURE_LEN;

fn write_headers(frame: &mut [u8]) {
    let total = FRAME_LEN as u16;
    frame[..IP_HEADER].copy_from_slice(&[
        0x45, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 10, 0, 0, 1, 10,
        0, 0, 2,
    ]);
    frame[2..4].copy_from_slice(&total.to_be_bytes());
    let udp_len = (FRAME_LEN - IP_HEADER) as u16;
    frame[IP_HEADER..SIGNATURE_AT].copy_from_slice(&[0x13, 0x88, 0x13, 0x89, 0, 0, 0, 0]);
    frame[IP_HEADER + 4..IP_HEADER + 6].copy_from_slice(&udp_len.to_be_bytes());
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    batch::init();
    println!("Kernel selection ({:.1} ms):", start.elapsed().as_secs_f64() * 1e3);
    batch::dump_info(&mut io::stdout())?;

    let mut frames = vec![vec![0u8; FRAME_LEN]; FRAMES];
    let start = Instant::now();

    // Transmit side: headers, PRBS payloads, signatures, then checksums.
    for frame in frames.iter_mut() {
        write_headers(frame);
    }
    {
        let mut payloads: Vec<&mut [u8]> = frames.iter_mut().map(|f| &mut f[PAYLOAD_AT..]).collect();
        batch::fill_prbs(&mut payloads, 0x2bad_cafe)?;
    }
    {
        let stream_ids: Vec<u32> = (0..FRAMES as u32).map(|i| i % 4).collect();
        let sequences: Vec<u32> = (0..FRAMES as u32).map(|i| i / 4).collect();
        let mut signatures: Vec<&mut [u8]> =
            frames.iter_mut().map(|f| &mut f[SIGNATURE_AT..PAYLOAD_AT]).collect();
        batch::encode_signatures(&mut signatures, &stream_ids, &sequences, FLAG_PRBS, 1_000_000)?;
    }
    let mut checksums = vec![0u16; FRAMES];
    {
        let headers: Vec<&[u8]> = frames.iter().map(|f| &f[..IP_HEADER]).collect();
        batch::ipv4_header_checksums(&headers, &mut checksums)?;
    }
    for (frame, csum) in frames.iter_mut().zip(&checksums) {
        frame[10..12].copy_from_slice(&csum.to_be_bytes());
    }
    {
        let packets: Vec<&[u8]> = frames.iter().map(|f| &f[..]).collect();
        batch::ipv4_tcpudp_checksums(&packets, &mut checksums)?;
    }
    for (frame, csum) in frames.iter_mut().zip(&checksums) {
        frame[IP_HEADER + 6..IP_HEADER + 8].copy_from_slice(&csum.to_be_bytes());
    }
    let tx = start.elapsed();

    // Simulate a few bit errors on the wire.
    frames[17][PAYLOAD_AT + 100] ^= 0x04;
    frames[900][PAYLOAD_AT + 3] ^= 0x80;

    // Receive side.
    let start = Instant::now();
    let signatures: Vec<&[u8]> = frames.iter().map(|f| &f[SIGNATURE_AT..]).collect();
    let mut decoded = vec![Signature::default(); FRAMES];
    let n = batch::decode_signatures(&signatures, &mut decoded)?;

    let payloads: Vec<&[u8]> = frames.iter().map(|f| &f[PAYLOAD_AT..]).collect();
    let mut bit_errors = vec![0u32; FRAMES];
    let any_errors = batch::verify_prbs(&payloads, &mut bit_errors)?;

    let packets: Vec<&[u8]> = frames.iter().map(|f| &f[..]).collect();
    let mut verify = vec![0u16; FRAMES];
    batch::ipv4_header_checksums(&packets, &mut verify)?;
    let good_headers = verify.iter().filter(|&&c| c == 0xffff).count();

    let mut per_stream = [0u32; 4];
    let stream_values: Vec<u32> = decoded[..n].iter().map(|s| s.stream_id).collect();
    batch::unpack_and_sum_indexicals(&stream_values, &[0x3], &mut [&mut per_stream[..]])?;
    let rx = start.elapsed();

    println!("\nTransmit: {} frames in {:.3} ms", FRAMES, tx.as_secs_f64() * 1e3);
    println!("Receive:  {} frames in {:.3} ms", FRAMES, rx.as_secs_f64() * 1e3);
    println!("Signatures decoded: {}", n);
    println!("Valid IPv4 headers: {}", good_headers);
    println!("Frames per stream:  {:?}", per_stream);
    if any_errors {
        for (i, errors) in bit_errors.iter().enumerate().filter(|(_, &e)| e > 0) {
            println!("Frame {}: {} bit errors", i, errors);
        }
    }
    Ok(())
}
