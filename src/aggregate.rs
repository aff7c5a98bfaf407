//! Status Aggregator: per-slot snapshots built from the host and the status
//! directory, plus a bounded tail of a worker's captured output.

use std::collections::{HashMap, VecDeque};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::paths::HivePaths;
use crate::session::{SessionRegistry, SlotId};
use crate::status::{Probe, StatusStore, WorkerStatus};
use crate::worktree::slot_path;
use crate::hlog_trace;

/// Point-in-time view of one slot.
///
/// `running` and `status` come from two independent reads. When `running`
/// is false the status content is stale, whatever it says.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerInfo {
    pub slot: SlotId,
    pub session: String,
    pub worktree: PathBuf,
    pub log: PathBuf,
    pub running: bool,
    pub status: Option<WorkerStatus>,
}

impl WorkerInfo {
    /// Status worth showing: `None` when the worker is not running.
    pub fn live_status(&self) -> Option<&WorkerStatus> {
        if self.running {
            self.status.as_ref()
        } else {
            None
        }
    }
}

pub struct Aggregator {
    registry: SessionRegistry,
    store: StatusStore,
    paths: HivePaths,
    workers: u8,
    last_good: HashMap<SlotId, WorkerStatus>,
}

impl Aggregator {
    pub fn new(registry: SessionRegistry, paths: HivePaths, workers: u8) -> Self {
        Self {
            store: StatusStore::for_project(&paths),
            registry,
            paths,
            workers,
            last_good: HashMap::new(),
        }
    }

    pub fn workers(&self) -> u8 {
        self.workers
    }

    /// One poll round over every slot, in slot order.
    pub fn poll(&mut self) -> Vec<WorkerInfo> {
        let infos: Vec<WorkerInfo> = SlotId::all(self.workers)
            .map(|slot| self.poll_slot(slot))
            .collect();
        hlog_trace!(
            "Aggregator poll: {}/{} running",
            infos.iter().filter(|i| i.running).count(),
            infos.len()
        );
        infos
    }

    /// Liveness and status for one slot, read back-to-back.
    pub fn poll_slot(&mut self, slot: SlotId) -> WorkerInfo {
        let running = self.registry.exists(slot);
        let status = match self.store.probe(slot) {
            Probe::Present(status) => {
                self.last_good.insert(slot, status.clone());
                Some(status)
            }
            Probe::Missing => {
                self.last_good.remove(&slot);
                None
            }
            // Likely caught mid-write; keep showing what we had.
            Probe::Malformed => self.last_good.get(&slot).cloned(),
        };

        let isolated = slot_path(self.paths.worktree_base(), slot);
        let worktree = if isolated.exists() {
            isolated
        } else {
            self.paths.root().to_path_buf()
        };

        WorkerInfo {
            slot,
            session: self.registry.name(slot),
            worktree,
            log: self.paths.log_file(slot),
            running,
            status,
        }
    }
}

/// Default number of trailing log lines kept in memory.
pub const DEFAULT_TAIL_LINES: usize = 200;

/// Bytes read back per retained line when a tail starts on an existing
/// file or falls far behind.
const BYTES_PER_LINE: u64 = 512;

/// An unterminated line longer than this is emitted as it stands.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

/// Incremental reader for the end of a growing log file.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    offset: u64,
    capacity: usize,
    lines: VecDeque<String>,
    // Raw bytes after the last newline, so a character split across two
    // flushes is decoded whole.
    partial: Vec<u8>,
}

impl LogTail {
    pub fn new(path: PathBuf, capacity: usize) -> Self {
        Self {
            path,
            offset: 0,
            capacity: capacity.max(1),
            lines: VecDeque::new(),
            partial: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Follow a different file from its beginning.
    pub fn retarget(&mut self, path: PathBuf) {
        if path != self.path {
            self.path = path;
            self.reset();
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.lines.clear();
        self.partial.clear();
    }

    fn window(&self) -> u64 {
        self.capacity as u64 * BYTES_PER_LINE
    }

    /// Read whatever was appended since the last poll. Returns true when the
    /// retained window changed.
    pub fn poll(&mut self) -> bool {
        let len = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                let had_content = self.offset > 0 || !self.lines.is_empty();
                self.reset();
                return had_content;
            }
        };

        let mut changed = false;
        if len < self.offset {
            hlog_trace!("Log {} shrank; restarting tail", self.path.display());
            changed = !self.lines.is_empty();
            self.reset();
        }
        if len == self.offset {
            return changed;
        }

        // Too far behind: skip ahead and drop the line we land inside.
        let mut mid_line = false;
        if len - self.offset > self.window() {
            self.offset = len - self.window();
            self.partial.clear();
            mid_line = true;
        }

        let mut bytes = match self.read_from_offset(len) {
            Ok(bytes) => bytes,
            Err(e) => {
                hlog_trace!("Log read failed for {}: {}", self.path.display(), e);
                return changed;
            }
        };
        self.offset += bytes.len() as u64;
        if mid_line {
            match bytes.iter().position(|b| *b == b'\n') {
                Some(idx) => {
                    bytes.drain(..=idx);
                }
                None => bytes.clear(),
            }
        }
        self.push_bytes(&bytes) || changed
    }

    fn read_from_offset(&self, len: u64) -> std::io::Result<Vec<u8>> {
        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut buf = Vec::new();
        file.take(len - self.offset).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> bool {
        self.partial.extend_from_slice(bytes);

        let mut pushed = false;
        let mut consumed = 0;
        while let Some(idx) = self.partial[consumed..].iter().position(|b| *b == b'\n') {
            let end = consumed + idx;
            let line = decode_line(&self.partial[consumed..end]);
            self.lines.push_back(line);
            pushed = true;
            consumed = end + 1;
        }
        self.partial.drain(..consumed);

        while self.partial.len() > MAX_LINE_BYTES {
            let cut = char_boundary(&self.partial, MAX_LINE_BYTES);
            let line = decode_line(&self.partial[..cut]);
            self.lines.push_back(line);
            self.partial.drain(..cut);
            pushed = true;
        }

        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
        pushed
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Largest cut at or below `max` that does not split a UTF-8 sequence.
fn char_boundary(bytes: &[u8], max: usize) -> usize {
    match std::str::from_utf8(&bytes[..max]) {
        Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => e.valid_up_to(),
        _ => max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ProjectIdentity;
    use crate::testing::FakeHost;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn slot(n: u8) -> SlotId {
        SlotId::new(n, 4).unwrap()
    }

    fn setup() -> (TempDir, Arc<FakeHost>, HivePaths, Aggregator) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("proj");
        std::fs::create_dir_all(&root).unwrap();
        let paths = HivePaths::new(&root).with_worktree_base(dir.path().join("wt"));
        let host = Arc::new(FakeHost::new());
        let registry = SessionRegistry::new(host.clone(), ProjectIdentity::new("proj"));
        let agg = Aggregator::new(registry, paths.clone(), 4);
        (dir, host, paths, agg)
    }

    fn write_status(paths: &HivePaths, s: SlotId, contents: &str) {
        let path = paths.status_file(s);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_absent_slot_reports_not_running_without_status() {
        let (_dir, _host, paths, mut agg) = setup();
        let infos = agg.poll();
        assert_eq!(infos.len(), 4);
        let third = &infos[2];
        assert_eq!(third.slot, slot(3));
        assert!(!third.running);
        assert!(third.status.is_none());
        assert_eq!(third.worktree, paths.root());
    }

    #[test]
    fn test_running_slot_with_overflowing_percent() {
        let (_dir, host, paths, mut agg) = setup();
        host.insert_session("hive-proj-worker-1");
        write_status(
            &paths,
            slot(1),
            r#"{"status":"coding","branch":"feature/x","percent":150}"#,
        );
        let info = agg.poll_slot(slot(1));
        assert!(info.running);
        let status = info.live_status().unwrap();
        assert_eq!(status.display_percent(), Some(100));
        assert_eq!(status.branch.as_deref(), Some("feature/x"));
    }

    #[test]
    fn test_malformed_read_keeps_previous_value() {
        let (_dir, host, paths, mut agg) = setup();
        host.insert_session("hive-proj-worker-1");
        write_status(&paths, slot(1), r#"{"status":"testing","percent":40}"#);
        let first = agg.poll_slot(slot(1)).status.unwrap();

        write_status(&paths, slot(1), r#"{"status":"revi"#);
        let second = agg.poll_slot(slot(1)).status.unwrap();
        assert_eq!(first, second);

        std::fs::remove_file(paths.status_file(slot(1))).unwrap();
        assert!(agg.poll_slot(slot(1)).status.is_none());
    }

    #[test]
    fn test_killed_session_hides_stale_status() {
        let (_dir, host, paths, mut agg) = setup();
        host.insert_session("hive-proj-worker-2");
        write_status(&paths, slot(2), r#"{"status":"coding"}"#);
        assert!(agg.poll_slot(slot(2)).live_status().is_some());

        host.remove_session("hive-proj-worker-2");
        let info = agg.poll_slot(slot(2));
        assert!(!info.running);
        assert!(info.status.is_some());
        assert!(info.live_status().is_none());
    }

    fn append(path: &Path, text: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn test_tail_reads_only_new_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker-1.log");
        let mut tail = LogTail::new(path.clone(), 3);
        assert!(!tail.poll());

        append(&path, "one\ntwo\n");
        assert!(tail.poll());
        assert_eq!(tail.lines().collect::<Vec<_>>(), vec!["one", "two"]);
        assert!(!tail.poll());

        append(&path, "three\nfour\nfive\n");
        assert!(tail.poll());
        assert_eq!(
            tail.lines().collect::<Vec<_>>(),
            vec!["three", "four", "five"]
        );
    }

    #[test]
    fn test_tail_holds_partial_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker-1.log");
        let mut tail = LogTail::new(path.clone(), 10);

        append(&path, "build ");
        assert!(!tail.poll());
        append(&path, "ok\r\n");
        assert!(tail.poll());
        assert_eq!(tail.lines().collect::<Vec<_>>(), vec!["build ok"]);
    }

    #[test]
    fn test_tail_joins_character_split_across_flushes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker-1.log");
        let mut tail = LogTail::new(path.clone(), 10);

        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"caf\xC3").unwrap();
        assert!(!tail.poll());
        f.write_all(b"\xA9 \xE2\x94").unwrap();
        assert!(!tail.poll());
        f.write_all(b"\x80\n").unwrap();
        assert!(tail.poll());
        assert_eq!(tail.lines().collect::<Vec<_>>(), vec!["café ─"]);
    }

    #[test]
    fn test_tail_starts_near_end_of_large_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker-1.log");
        let body: String = (0..10_000).map(|i| format!("line {}\n", i)).collect();
        append(&path, &body);

        let mut tail = LogTail::new(path.clone(), 3);
        assert!(tail.poll());
        assert_eq!(
            tail.lines().collect::<Vec<_>>(),
            vec!["line 9997", "line 9998", "line 9999"]
        );
        assert!(tail.partial.is_empty());
    }

    #[test]
    fn test_tail_flushes_unterminated_redraws() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker-1.log");
        let mut tail = LogTail::new(path.clone(), 1000);

        // Spinner redraws with carriage returns and never a newline.
        let frame = "\r⠋ thinking…";
        let mut written = 0;
        while written <= MAX_LINE_BYTES * 2 {
            append(&path, frame);
            written += frame.len();
            tail.poll();
        }
        assert!(tail.partial.len() <= MAX_LINE_BYTES);
        assert!(tail.len() >= 2);
        assert!(tail.lines().all(|l| !l.contains('\u{FFFD}')));
    }

    #[test]
    fn test_tail_resets_on_shrink_and_disappearance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("worker-1.log");
        let mut tail = LogTail::new(path.clone(), 10);

        append(&path, "first run line one\nfirst run line two\n");
        tail.poll();
        assert_eq!(tail.len(), 2);

        std::fs::write(&path, "new\n").unwrap();
        assert!(tail.poll());
        assert_eq!(tail.lines().collect::<Vec<_>>(), vec!["new"]);

        std::fs::remove_file(&path).unwrap();
        assert!(tail.poll());
        assert!(tail.is_empty());

        append(&path, "again\n");
        tail.poll();
        assert_eq!(tail.lines().collect::<Vec<_>>(), vec!["again"]);
    }

    #[test]
    fn test_retarget_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("worker-1.log");
        let b = dir.path().join("worker-2.log");
        append(&a, "from a\n");
        append(&b, "from b\n");

        let mut tail = LogTail::new(a, 10);
        tail.poll();
        tail.retarget(b.clone());
        assert!(tail.is_empty());
        tail.poll();
        assert_eq!(tail.lines().collect::<Vec<_>>(), vec!["from b"]);
        assert_eq!(tail.path(), b);
    }
}
