use thiserror::Error;

#[derive(Debug, Error)]
pub enum StubError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to open archive {}: {source}", path.display())]
    JarOpen {
        path: std::path::PathBuf,
        source: zip::result::ZipError,
    },
    #[error("failed to parse class {entry}: {source}")]
    ClassParse {
        entry: String,
        source: ristretto_classfile::Error,
    },
    #[error("failed to serialize class {name}: {source}")]
    ClassWrite {
        name: String,
        source: ristretto_classfile::Error,
    },
    #[error("entry {entry} vanished from classpath {classpath} during generation")]
    MissingEntry { classpath: usize, entry: String },

    #[error("artifact path {} has no file name", path.display())]
    ArtifactFileName { path: std::path::PathBuf },
    #[error("at least one classpath is required")]
    EmptyClasspaths,
    #[error("classpath loader is closed")]
    LoaderClosed,
}

pub type Result<T> = std::result::Result<T, StubError>;
