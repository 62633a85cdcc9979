//! # Reference Audio
//!
//! Looks up a word's recording and opens it for streaming.
//!
//! ## Lookup steps:
//! 1. Find the word in the store
//! 2. Take its stored audio filename
//! 3. Resolve the filename inside the audio directory ([`library`])
//! 4. Check that a regular file exists there
//! 5. Open it for reading
//!
//! Every failure is classified as not-found, invalid-input, or internal and
//! turned into an HTTP response by the handler layer.

pub mod library;

pub use library::{AudioLibrary, PathRejection};

use crate::db::WordStore;
use crate::error::AppError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tracing::{debug, error, warn};

/// MIME type reported for every reference recording.
pub const AUDIO_CONTENT_TYPE: &str = "audio/wav";

/// Client-facing message for any path that fails validation. Deliberately
/// says nothing about the path that was attempted.
pub const INVALID_PATH_MESSAGE: &str = "Invalid audio file path";

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Word {0} not found")]
    WordNotFound(i64),

    #[error("No audio file for word {0}")]
    NoAudio(i64),

    #[error("{}", INVALID_PATH_MESSAGE)]
    InvalidPath(#[source] PathRejection),

    #[error("Audio file not found on disk: {0}")]
    MissingOnDisk(String),

    #[error("Word store error: {0:#}")]
    Store(anyhow::Error),

    #[error("Failed to read audio file: {0}")]
    Io(#[from] std::io::Error),
}

/// Status-like classification of an [`AudioError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioErrorKind {
    NotFound,
    InvalidInput,
    Internal,
}

impl AudioError {
    pub fn kind(&self) -> AudioErrorKind {
        match self {
            AudioError::WordNotFound(_) | AudioError::NoAudio(_) | AudioError::MissingOnDisk(_) => {
                AudioErrorKind::NotFound
            }
            AudioError::InvalidPath(_) => AudioErrorKind::InvalidInput,
            AudioError::Store(_) | AudioError::Io(_) => AudioErrorKind::Internal,
        }
    }
}

impl From<AudioError> for AppError {
    fn from(err: AudioError) -> Self {
        match err.kind() {
            AudioErrorKind::NotFound => AppError::NotFound(err.to_string()),
            AudioErrorKind::InvalidInput => AppError::InvalidInput(err.to_string()),
            // Store and I/O details stay in the server log.
            AudioErrorKind::Internal => AppError::Internal("Failed to load audio".to_string()),
        }
    }
}

/// An opened recording, ready to be streamed.
///
/// Dropping it closes the file handle.
#[derive(Debug)]
pub struct AudioFile {
    pub file: File,
    pub len: u64,
    /// Canonical location on disk. Only for logging, never sent to clients.
    pub path: PathBuf,
    /// The filename as stored for the word, used as the download name.
    pub filename: String,
}

/// Ties the word store to the audio library.
#[derive(Clone)]
pub struct AudioService {
    words: Arc<dyn WordStore>,
    library: Arc<AudioLibrary>,
}

impl AudioService {
    pub fn new(words: Arc<dyn WordStore>, library: AudioLibrary) -> Self {
        Self {
            words,
            library: Arc::new(library),
        }
    }

    pub fn library(&self) -> &AudioLibrary {
        &self.library
    }

    /// Open the reference recording for `word_id`.
    pub async fn open(&self, word_id: i64) -> Result<AudioFile, AudioError> {
        let result = self.open_inner(word_id).await;

        match &result {
            Ok(audio) => debug!(word_id, path = %audio.path.display(), bytes = audio.len, "Serving audio"),
            Err(err @ AudioError::InvalidPath(rejection)) => {
                warn!(word_id, reason = %rejection, "{}", err)
            }
            Err(err) if err.kind() == AudioErrorKind::Internal => error!(word_id, error = %err, "Audio lookup failed"),
            Err(err) => debug!(word_id, "{}", err),
        }

        result
    }

    async fn open_inner(&self, word_id: i64) -> Result<AudioFile, AudioError> {
        let word = self
            .words
            .find_word(word_id)
            .await
            .map_err(AudioError::Store)?
            .ok_or(AudioError::WordNotFound(word_id))?;

        let filename = word
            .audio_filename()
            .ok_or(AudioError::NoAudio(word_id))?
            .to_string();

        let library = Arc::clone(&self.library);
        let name = filename.clone();
        let path = tokio::task::spawn_blocking(move || library.resolve(&name))
            .await
            .map_err(|join_err| {
                // A panicked or cancelled resolver is treated like any other
                // canonicalization failure.
                AudioError::InvalidPath(PathRejection::Canonicalize(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    join_err.to_string(),
                )))
            })?
            .map_err(AudioError::InvalidPath)?;

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(AudioError::MissingOnDisk(filename)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(AudioError::MissingOnDisk(filename))
            }
            Err(err) => return Err(AudioError::Io(err)),
        };

        let file = match File::open(&path).await {
            Ok(file) => file,
            // Deleted between the stat and the open
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(AudioError::MissingOnDisk(filename))
            }
            Err(err) => return Err(AudioError::Io(err)),
        };

        Ok(AudioFile {
            file,
            len: metadata.len(),
            path,
            filename,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::words::MemoryWordStore;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn service(dir: &TempDir, store: MemoryWordStore) -> AudioService {
        AudioService::new(Arc::new(store), AudioLibrary::new(dir.path()))
    }

    #[tokio::test]
    async fn test_open_existing_recording() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("moien.wav"), b"RIFF....WAVE").unwrap();
        let service = service(&dir, MemoryWordStore::default().with_word(7, Some("moien.wav")));

        let mut audio = service.open(7).await.unwrap();
        assert_eq!(audio.filename, "moien.wav");
        assert_eq!(audio.len, 12);

        let mut bytes = Vec::new();
        audio.file.read_to_end(&mut bytes).await.unwrap();
        assert_eq!(bytes, b"RIFF....WAVE");
    }

    #[tokio::test]
    async fn test_unknown_word_and_missing_filename_are_distinct_not_found() {
        let dir = TempDir::new().unwrap();
        let store = MemoryWordStore::default()
            .with_word(1, None)
            .with_word(2, Some(""));
        let service = service(&dir, store);

        let unknown = service.open(9).await.unwrap_err();
        let no_audio = service.open(1).await.unwrap_err();
        let empty = service.open(2).await.unwrap_err();

        assert_eq!(unknown.kind(), AudioErrorKind::NotFound);
        assert_eq!(no_audio.kind(), AudioErrorKind::NotFound);
        assert_eq!(empty.kind(), AudioErrorKind::NotFound);
        assert_eq!(unknown.to_string(), "Word 9 not found");
        assert_eq!(no_audio.to_string(), "No audio file for word 1");
        assert_ne!(unknown.to_string(), no_audio.to_string());
    }

    #[tokio::test]
    async fn test_traversal_is_invalid_input_with_generic_message() {
        let dir = TempDir::new().unwrap();
        let service = service(
            &dir,
            MemoryWordStore::default().with_word(8, Some("../../../etc/passwd")),
        );

        let err = service.open(8).await.unwrap_err();
        assert_eq!(err.kind(), AudioErrorKind::InvalidInput);
        assert_eq!(err.to_string(), INVALID_PATH_MESSAGE);
    }

    #[tokio::test]
    async fn test_deleted_file_and_directory_are_missing_on_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("greetings")).unwrap();
        let store = MemoryWordStore::default()
            .with_word(1, Some("gone.wav"))
            .with_word(2, Some("greetings"));
        let service = service(&dir, store);

        let gone = service.open(1).await.unwrap_err();
        assert_eq!(gone.kind(), AudioErrorKind::NotFound);
        assert_eq!(gone.to_string(), "Audio file not found on disk: gone.wav");

        let directory = service.open(2).await.unwrap_err();
        assert!(matches!(directory, AudioError::MissingOnDisk(ref name) if name == "greetings"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dangling_symlink_is_missing_on_disk() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("takes")).unwrap();
        std::os::unix::fs::symlink("takes/gone.wav", dir.path().join("moien.wav")).unwrap();
        let service = service(&dir, MemoryWordStore::default().with_word(7, Some("moien.wav")));

        let err = service.open(7).await.unwrap_err();
        assert_eq!(err.kind(), AudioErrorKind::NotFound);
        assert_eq!(err.to_string(), "Audio file not found on disk: moien.wav");
    }

    #[test]
    fn test_internal_errors_hide_details_from_clients() {
        let err: AppError = AudioError::Store(anyhow::anyhow!("disk I/O error at /var/db")).into();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(!err.message().contains("/var/db"));
    }
}
