//! Decoding of the `__dbg_output` shader log stream.
//!
//! Shaders may request a buffer named `__dbg_output` and append log
//! records to it: a leading `i32` occupancy count followed by op codes
//! (1 = 4-byte-aligned null-terminated string, 2 = `i32`, 3 = `f32`).
//! After every dispatch the device drains the buffer to stdout and
//! resets the occupancy.

use std::io::Write as _;

/// Name of the shader debug log buffer.
pub const DEBUG_BUFFER_NAME: &str = "__dbg_output";

/// Decode and print one debug buffer, then reset it.
///
/// `words` is the buffer viewed as `i32` words, starting with the
/// occupancy count.
pub fn drain_debug_buffer(words: &mut [i32]) {
    if words.is_empty() {
        return;
    }

    let occupancy = words[0].min((words.len() - 1) as i32);
    if occupancy <= 0 {
        return;
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let mut k = 0usize;
    while (k as i32) < occupancy {
        let op = words[k + 1];
        match op {
            1 => {
                // String payload, 4 bytes per word until the terminator
                k += 1;
                'words: loop {
                    let Some(word) = words.get(k + 1) else {
                        break;
                    };
                    let bytes = word.to_ne_bytes();
                    for byte in bytes {
                        if byte == 0 {
                            break 'words;
                        }
                        let _ = out.write_all(&[byte]);
                    }
                    k += 1;
                }
            }
            2 => {
                k += 1;
                if let Some(word) = words.get(k + 1) {
                    let _ = write!(out, "{word}");
                }
            }
            3 => {
                k += 1;
                if let Some(word) = words.get(k + 1) {
                    let _ = write!(out, "{}", f32::from_bits(*word as u32));
                }
            }
            _ => break,
        }
        k += 1;
    }

    let _ = out.flush();

    // Reset occupancy so shaders start a fresh stream
    words[0] = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_left_alone() {
        let mut words = [0i32; 8];
        drain_debug_buffer(&mut words);
        assert_eq!(words[0], 0);
    }

    #[test]
    fn occupancy_resets_after_drain() {
        // op 2 (i32) with value 42
        let mut words = [2i32, 2, 42, 0, 0];
        drain_debug_buffer(&mut words);
        assert_eq!(words[0], 0);
    }

    #[test]
    fn bad_op_codes_stop_the_scan() {
        let mut words = [3i32, 9, 1, 2, 0];
        drain_debug_buffer(&mut words);
        assert_eq!(words[0], 0);
    }
}
