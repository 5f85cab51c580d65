//! Allocates one production shared state, zero-fills it and checks that every
//! independently updated field starts on a cache line.
//!
//! Exits non-zero on the first misaligned field. Set `RUST_LOG=debug` for
//! allocator and ABI details.

extern crate env_logger;
#[macro_use]
extern crate log;
extern crate pcm_shm;

use std::io::{self, BufWriter, Write};
use std::process;

use pcm_shm::validate::detect_cache_line_size;
use pcm_shm::{Check, Layout, SharedPcmState, SharedRegion, Validator, CACHE_LINE_SIZE, PCM_ABI};

fn main() {
	env_logger::init();

	println!("Testing alignment\n");

	info!("{}", *PCM_ABI);
	match detect_cache_line_size() {
		Some(n) if n != CACHE_LINE_SIZE => warn!(
			"platform cache line is {} bytes, layout is padded for {}",
			n, CACHE_LINE_SIZE
		),
		_ => {}
	}

	let region = match SharedRegion::<SharedPcmState>::allocate() {
		Ok(r) => r,
		Err(e) => {
			println!("Memory allocation failed\n");
			error!("{}", e);
			process::exit(1);
		}
	};

	let stdout = io::stdout();
	let mut out = BufWriter::new(stdout.lock());

	let result = check_layout::<SharedPcmState, _>(region.block().addr(), &mut out)
		.and_then(|passed| out.flush().map(|_| passed));

	// process::exit skips destructors
	drop(out);
	drop(region);

	process::exit(exit_code(&result));
}

/// Validates a `T` starting at `base`, writing one line per field checked to
/// `out`.
///
/// Returns whether every field passed. Stops at the first write error.
fn check_layout<T: Layout, W: Write>(base: usize, out: &mut W) -> io::Result<bool> {
	let mut write_err = None;

	let result = Validator::default().validate_at::<T, _>(base, |check| {
		if write_err.is_none() {
			if let Err(e) = print_check(out, check) {
				write_err = Some(e);
			}
		}
	});

	if let Some(e) = write_err {
		return Err(e);
	}

	match result {
		Ok(report) => {
			writeln!(out, "\n------ All passed ------\n")?;
			debug!("{} fields checked", report.checks);
			Ok(true)
		}
		Err(e) => {
			error!("{}", e);
			Ok(false)
		}
	}
}

fn print_check<W: Write>(out: &mut W, check: &Check) -> io::Result<()> {
	let path = check.path.to_string();

	if check.passed() {
		writeln!(out, "Checking: {:<20}\t\tPassed", path)
	} else {
		writeln!(out, "Checking: {:<20}\t\tFailed", path)?;
		writeln!(out, "Current alignment: {}\n", check.remainder)
	}
}

fn exit_code(result: &io::Result<bool>) -> i32 {
	match result {
		Ok(true) => 0,
		Ok(false) => 1,
		Err(e) => {
			error!("writing results: {}", e);
			1
		}
	}
}
