//! Recording and replay of published draw lists.
//!
//! A [`Session`] is the sequence of draw-list sets published while recording,
//! stored as a bincode `.imgrcd` file. A [`Replay`] plays one back in a loop;
//! its lists are drawn underneath the live GUI.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::draw::DrawList;
use crate::error::ImGuiWsError;

/// File extension of saved sessions.
pub const RECORD_EXTENSION: &str = "imgrcd";

/// Recorded frames, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    frames: Vec<Vec<DrawList>>,
}

impl Session {
    pub fn add_frame(&mut self, draw_lists: &[DrawList]) {
        self.frames.push(draw_lists.to_vec());
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&[DrawList]> {
        self.frames.get(index).map(Vec::as_slice)
    }

    pub fn save(&self, path: &Path) -> Result<(), ImGuiWsError> {
        let mut file = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut file, self).map_err(|e| ImGuiWsError::Encoding(e.to_string()))?;
        file.flush()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ImGuiWsError> {
        let file = BufReader::new(File::open(path)?);
        bincode::deserialize_from(file).map_err(|e| ImGuiWsError::Encoding(e.to_string()))
    }

    /// Save as `<dir>/<YYYYmmdd_HHMMSS>.imgrcd`, creating `dir` if needed.
    pub fn save_in_dir(&self, dir: &Path) -> Result<PathBuf, ImGuiWsError> {
        fs::create_dir_all(dir)?;
        let stem = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("{stem}.{RECORD_EXTENSION}"));
        self.save(&path)?;
        info!("recorded {} frame(s) to {}", self.n_frames(), path.display());
        Ok(path)
    }
}

/// Captures each newly published set of draw lists.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    session: Session,
    last: Option<Arc<Vec<DrawList>>>,
}

impl Recorder {
    /// Append `draw_lists` unless it is the set captured last.
    pub(crate) fn capture(&mut self, draw_lists: &Arc<Vec<DrawList>>) {
        if self.last.as_ref().is_some_and(|last| Arc::ptr_eq(last, draw_lists)) {
            return;
        }
        self.session.add_frame(draw_lists);
        self.last = Some(Arc::clone(draw_lists));
    }

    pub(crate) fn finish(self) -> Session {
        self.session
    }
}

/// Looping playback of a [`Session`].
#[derive(Debug, Clone)]
pub struct Replay {
    session: Session,
    frame_index: usize,
    playing: bool,
}

impl Replay {
    /// Start playing from the first frame.
    pub fn new(session: Session) -> Self {
        Self {
            session,
            frame_index: 0,
            playing: true,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ImGuiWsError> {
        let session = Session::load(path)?;
        info!("replaying {} frame(s) from {}", session.n_frames(), path.display());
        Ok(Self::new(session))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Jump to `index`, clamped to the last frame.
    pub fn seek(&mut self, index: usize) {
        self.frame_index = index.min(self.session.n_frames().saturating_sub(1));
    }

    /// Lists of the current frame, then advance by one (wrapping) if playing.
    pub fn next_frame(&mut self) -> &[DrawList] {
        let n = self.session.n_frames();
        if n == 0 {
            return &[];
        }
        let index = self.frame_index;
        if self.playing {
            self.frame_index = (index + 1) % n;
        }
        self.session.frame(index).unwrap_or_default()
    }

    /// Replayed lists followed by `live`.
    pub fn merge(&mut self, live: Vec<DrawList>) -> Vec<DrawList> {
        let mut merged = self.next_frame().to_vec();
        merged.extend(live);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(tag: u16) -> DrawList {
        DrawList {
            idx: vec![tag; 3],
            ..Default::default()
        }
    }

    fn session(tags: &[u16]) -> Session {
        let mut session = Session::default();
        for &tag in tags {
            session.add_frame(&[list(tag)]);
        }
        session
    }

    #[test]
    fn recorder_skips_unchanged_lists() {
        let mut recorder = Recorder::default();
        let a = Arc::new(vec![list(1)]);
        recorder.capture(&a);
        recorder.capture(&a);
        recorder.capture(&Arc::new(vec![list(1)]));
        assert_eq!(recorder.finish().n_frames(), 2);
    }

    #[test]
    fn save_in_dir_round_trips() {
        let dir = tempfile::tempdir().expect("temp dir");
        let original = session(&[1, 2, 3]);
        let path = original.save_in_dir(&dir.path().join("records")).unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some(RECORD_EXTENSION));

        let replay = Replay::load(&path).unwrap();
        assert_eq!(replay.session(), &original);
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("bad.imgrcd");
        fs::write(&path, [0xff; 3]).unwrap();
        assert!(matches!(Session::load(&path), Err(ImGuiWsError::Encoding(_))));
    }

    #[test]
    fn replay_loops_and_pauses() {
        let mut replay = Replay::new(session(&[1, 2]));
        let tags: Vec<u16> = (0..5).map(|_| replay.next_frame()[0].idx[0]).collect();
        assert_eq!(tags, [1, 2, 1, 2, 1]);

        replay.pause();
        assert_eq!(replay.next_frame()[0].idx[0], 2);
        assert_eq!(replay.next_frame()[0].idx[0], 2);

        replay.seek(7);
        assert_eq!(replay.frame_index(), 1);
        replay.seek(0);
        replay.play();
        assert_eq!(replay.next_frame()[0].idx[0], 1);
    }

    #[test]
    fn replayed_lists_come_before_live_ones() {
        let mut replay = Replay::new(session(&[7]));
        let merged = replay.merge(vec![list(1), list(2)]);
        let tags: Vec<u16> = merged.iter().map(|l| l.idx[0]).collect();
        assert_eq!(tags, [7, 1, 2]);
    }

    #[test]
    fn empty_session_replays_nothing() {
        let mut replay = Replay::new(Session::default());
        assert!(replay.next_frame().is_empty());
        replay.seek(3);
        assert_eq!(replay.frame_index(), 0);
    }
}
