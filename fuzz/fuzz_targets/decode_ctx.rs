#![no_main]

use libfuzzer_sys::fuzz_target;
use stubwire_proto::{DecodeCtx, DecodeOutcome};

// First byte selects the sequence of reads, the rest is the message.
fuzz_target!(|data: &[u8]| {
    let Some((&script, message)) = data.split_first() else {
        return;
    };

    let mut ctx = DecodeCtx::new(message);
    let _ = ctx.decode_scratchpad_header();
    for step in 0..8 {
        match (script >> (step % 4)) & 0b111 {
            0 => _ = ctx.decode_int(),
            1 => _ = ctx.decode_str(),
            2 => _ = ctx.decode_buffer(),
            3 => _ = ctx.decode_present(),
            4 => _ = ctx.decode_callback(),
            5 => _ = ctx.decode_array_header(2),
            6 => _ = ctx.decode_fixed::<7>(),
            _ => _ = ctx.decode_bool(),
        }
        assert!(ctx.position() <= message.len());
    }

    let faulted = !ctx.is_ok();
    let outcome = ctx.finish();
    if faulted {
        assert!(!matches!(outcome, DecodeOutcome::Success));
    }
});
