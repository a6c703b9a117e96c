use crate::{MAX_ARGS, memory::UserMemory};

const PTR_SIZE: u64 = core::mem::size_of::<u64>() as u64;

/// Space-joins up to [`MAX_ARGS`] entries of the user `argv` array into `buf`.
///
/// Stops at the first null entry, the first faulting read, or when only the
/// terminator byte is left. A separator is written before every entry after
/// the first whose pointer is non-null, and stays even if that entry's string
/// read then faults or finds no room. `buf` is NUL-terminated on return.
/// Returns the joined length, excluding the NUL.
#[inline(always)]
pub fn fill_argv<M: UserMemory, const L: usize>(mem: &M, argv_ptr: u64, buf: &mut [u8; L]) -> usize {
    const { assert!(L > 1) };

    let mut pos = 0usize;

    if argv_ptr != 0 {
        for i in 0..MAX_ARGS {
            if pos >= L - 1 {
                break;
            }

            let arg = match mem.read_user_ptr(argv_ptr.wrapping_add(i as u64 * PTR_SIZE)) {
                Ok(ptr) if ptr != 0 => ptr,
                _ => break,
            };

            if i > 0 {
                buf[pos] = b' ';
                pos += 1;
            }

            let remaining = L - pos - 1;
            if remaining == 0 {
                break;
            }

            // The window is `remaining` bytes plus the slot for the helper's NUL.
            match mem.read_user_str(arg, &mut buf[pos..]) {
                Ok(copied) => pos += copied.min(remaining),
                Err(_) => break,
            }
        }
    }

    let end = if pos < L { pos } else { L - 1 };
    buf[end] = 0;
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ARGV_LEN, c_str_bytes, testing::FakeUser};

    fn joined(mem: &FakeUser, argv_ptr: u64) -> (Vec<u8>, [u8; ARGV_LEN]) {
        let mut buf = [0xAAu8; ARGV_LEN];
        let len = fill_argv(mem, argv_ptr, &mut buf);
        assert_eq!(buf[len], 0);
        (c_str_bytes(&buf).to_vec(), buf)
    }

    #[test]
    fn test_joins_with_single_spaces() {
        let mut mem = FakeUser::default();
        let argv = mem.argv(&["ls", "-la", "/tmp"]);
        let (out, _) = joined(&mem, argv);
        assert_eq!(out, b"ls -la /tmp");
    }

    #[test]
    fn test_empty_argv_yields_empty_string() {
        let mut mem = FakeUser::default();
        let argv = mem.argv(&[]);
        let (out, buf) = joined(&mem, argv);
        assert!(out.is_empty());
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_null_argv_pointer() {
        let mem = FakeUser::default();
        let (_, buf) = joined(&mem, 0);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_caps_at_sixteen_arguments() {
        let mut mem = FakeUser::default();
        let args: Vec<String> = (0..20).map(|i| format!("a{i}")).collect();
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let argv = mem.argv(&refs);

        let (out, _) = joined(&mem, argv);
        assert_eq!(out, b"a0 a1 a2 a3 a4 a5 a6 a7 a8 a9 a10 a11 a12 a13 a14 a15");
    }

    #[test]
    fn test_seventeen_arguments_keep_first_sixteen() {
        let mut mem = FakeUser::default();
        let args: Vec<String> = (0..17).map(|i| format!("x{i}")).collect();
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let argv = mem.argv(&refs);

        let (out, _) = joined(&mem, argv);
        let expected = args[..16].join(" ");
        assert_eq!(out, expected.as_bytes());
    }

    #[test]
    fn test_long_argument_truncated_to_buffer() {
        let mut mem = FakeUser::default();
        let long = "z".repeat(300);
        let argv = mem.argv(&[&long]);

        let (out, buf) = joined(&mem, argv);
        assert_eq!(out.len(), 255);
        assert!(out.iter().all(|&b| b == b'z'));
        assert_eq!(buf[255], 0);
    }

    #[test]
    fn test_overflow_across_arguments_stays_terminated() {
        let mut mem = FakeUser::default();
        let chunk = "y".repeat(100);
        let argv = mem.argv(&[&chunk, &chunk, &chunk, "tail"]);

        let (out, buf) = joined(&mem, argv);
        assert_eq!(out.len(), 255);
        assert_eq!(&out[..101], format!("{chunk} ").as_bytes());
        assert_eq!(buf[255], 0);
    }

    #[test]
    fn test_null_middle_entry_ends_join_without_trailing_space() {
        let mut mem = FakeUser::default();
        let argv = mem.argv_with_hole(&["prog", "one"], &["never"]);
        let (out, _) = joined(&mem, argv);
        assert_eq!(out, b"prog one");
    }

    #[test]
    fn test_faulting_pointer_slot_stops_iteration() {
        let mut mem = FakeUser::default();
        let argv = mem.argv(&["a", "b", "c"]);
        mem.fault_word(argv + 2 * 8);
        let (out, _) = joined(&mem, argv);
        assert_eq!(out, b"a b");
    }

    #[test]
    fn test_faulting_string_keeps_separator() {
        let mut mem = FakeUser::default();
        let argv = mem.argv(&["first", "second", "third"]);
        let second = mem.word(argv + 8);
        mem.fault_string(second);

        let (out, _) = joined(&mem, argv);
        assert_eq!(out, b"first ");
    }

    #[test]
    fn test_separator_may_take_last_content_byte() {
        let mut mem = FakeUser::default();
        let head = "h".repeat(254);
        let argv = mem.argv(&[&head, "next"]);

        let (out, buf) = joined(&mem, argv);
        assert_eq!(out.len(), 255);
        assert_eq!(&out[..254], head.as_bytes());
        assert_eq!(out[254], b' ');
        assert_eq!(buf[255], 0);
    }

    #[test]
    fn test_argv_array_at_address_space_end() {
        let mut mem = FakeUser::default();
        let argv = u64::MAX - 7;
        let only = mem.string("only");
        mem.put_word(argv, only);

        // the second slot address wraps to 0, which faults
        let (out, _) = joined(&mem, argv);
        assert_eq!(out, b"only");
        assert_eq!(mem.pointer_reads(), 2);
    }

    #[test]
    fn test_small_buffer() {
        let mut mem = FakeUser::default();
        let argv = mem.argv(&["abc", "def"]);
        let mut buf = [0xAAu8; 6];
        let len = fill_argv(&mem, argv, &mut buf);
        assert_eq!(len, 5);
        assert_eq!(&buf, b"abc d\0");
    }

    #[test]
    fn test_reads_are_bounded_by_arg_cap() {
        let mut mem = FakeUser::default();
        let args: Vec<String> = (0..64).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let argv = mem.argv(&refs);

        let _ = joined(&mem, argv);
        assert_eq!(mem.pointer_reads(), MAX_ARGS);
    }
}
