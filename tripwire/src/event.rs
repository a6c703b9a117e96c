use tripwire_common::{ExecRecord, c_str_bytes};

/// Owned, decoded form of an [`ExecRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecInfo {
    pub pid: u32,
    pub ppid: u32,
    pub uid: u32,
    pub gid: u32,
    pub comm: String,
    pub filename: String,
    pub argv: String,
}

impl ExecInfo {
    /// Decodes one ring sample; `None` when it is not exactly one record.
    pub fn decode(sample: &[u8]) -> Option<Self> {
        ExecRecord::from_bytes(sample).map(|record| Self::from(&record))
    }
}

impl From<&ExecRecord> for ExecInfo {
    fn from(record: &ExecRecord) -> Self {
        Self {
            pid: record.pid,
            ppid: record.ppid,
            uid: record.uid,
            gid: record.gid,
            comm: field_to_string(&record.comm),
            filename: field_to_string(&record.filename),
            argv: field_to_string(&record.argv),
        }
    }
}

fn field_to_string(field: &[u8]) -> String {
    String::from_utf8_lossy(c_str_bytes(field)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripwire_common::EXEC_RECORD_SIZE;

    fn put(field: &mut [u8], s: &[u8]) {
        field[..s.len()].copy_from_slice(s);
    }

    #[test]
    fn test_decode_sample() {
        let mut record = ExecRecord::zeroed();
        record.pid = 1234;
        record.ppid = 1;
        record.uid = 1000;
        record.gid = 1000;
        put(&mut record.comm, b"bash");
        put(&mut record.filename, b"/bin/ls");
        put(&mut record.argv, b"ls -la /tmp");

        let info = ExecInfo::decode(record.as_bytes()).unwrap();

        assert_eq!(
            info,
            ExecInfo {
                pid: 1234,
                ppid: 1,
                uid: 1000,
                gid: 1000,
                comm: "bash".to_string(),
                filename: "/bin/ls".to_string(),
                argv: "ls -la /tmp".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_rejects_short_and_long_samples() {
        assert!(ExecInfo::decode(&[0u8; EXEC_RECORD_SIZE - 1]).is_none());
        assert!(ExecInfo::decode(&[0u8; EXEC_RECORD_SIZE + 8]).is_none());
    }

    #[test]
    fn test_unterminated_field_takes_whole_buffer() {
        let mut record = ExecRecord::zeroed();
        record.comm = *b"abcdefghijklmnop";

        let info = ExecInfo::from(&record);
        assert_eq!(info.comm, "abcdefghijklmnop");
        assert_eq!(info.filename, "");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut record = ExecRecord::zeroed();
        put(&mut record.filename, b"/tmp/\xff\xfe");

        let info = ExecInfo::from(&record);
        assert_eq!(info.filename, "/tmp/\u{fffd}\u{fffd}");
    }
}
