use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("storage id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: uuid::Error,
    },
    #[snafu(display("failed to create storage directory at {path}"))]
    CreateStorageDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to read {what} blob from {path}"))]
    ReadBlob {
        stage: &'static str,
        what: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to write {what} blob to {path}"))]
    WriteBlob {
        stage: &'static str,
        what: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to replace {what} blob from {from} to {to}"))]
    ReplaceBlob {
        stage: &'static str,
        what: &'static str,
        from: String,
        to: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to remove {what} blob at {path}"))]
    RemoveBlob {
        stage: &'static str,
        what: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize {what} blob"))]
    SerializeBlob {
        stage: &'static str,
        what: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to deserialize {what} blob from {path}"))]
    DeserializeBlob {
        stage: &'static str,
        what: &'static str,
        path: String,
        source: serde_json::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;
