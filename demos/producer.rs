extern crate pcm_shm;

use std::thread;
use std::time::Duration;

use pcm_shm::{AbiContract, SharedRegion, SharedTelemetryState, Validator};

// A small machine: 4 cores, 2 sockets, 3 links per socket.
type State = SharedTelemetryState<4, 2, 3>;

fn main() {
	let contract = AbiContract::of::<State>();
	println!("{}", contract);

	let mut region = SharedRegion::<State>::allocate().unwrap();

	// Never hand out a region that failed validation
	Validator::default().validate(region.get()).unwrap();

	region.get_mut().stamp_version(&contract);
	region.get_mut().poll_ms = 100;

	for tick in 1..10u64 {
		let state = region.get_mut();
		state.last_update_tsc_begin = tick;

		for (i, core) in state.core.cores.iter_mut().enumerate() {
			core.core_id = i as u64;
			core.cycles += 1_000 * tick;
			core.instructions_retired += 1_500 * tick;
		}

		for socket in state.interconnect.outgoing.iter_mut() {
			for link in socket.links.iter_mut() {
				link.bytes += 64 * tick;
			}
		}

		state.last_update_tsc_end = tick;
		thread::sleep(Duration::from_millis(100));
	}

	let state = region.get();
	println!("version ok: {}", state.has_version(&contract));
	println!("core 0 cycles: {}", state.core.cores[0].cycles);
	println!("socket 1 link 2 bytes out: {}", state.interconnect.outgoing[1].links[2].bytes);
}
