use prost::{Message, bytes::BytesMut};
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use tokio::sync::mpsc;

use crate::infra::{Action, Position};
use crate::planners::lookahead::{Episode, Sample};
use crate::state::{GridSnapshot, Map};

const FILE_PREFIX: &str = "data";
const FILE_EXTENSION: &str = "rbd";

#[derive(Debug)]
pub enum DatasetError {
    Io(io::Error),
    Decode(prost::DecodeError),
    Format(String),
}

impl fmt::Display for DatasetError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DatasetError::Io(err) => write!(formatter, "Dataset I/O failed: {}", err),
            DatasetError::Decode(err) => write!(formatter, "Malformed dataset record: {}", err),
            DatasetError::Format(message) => write!(formatter, "Invalid dataset record: {}", message),
        }
    }
}

impl Error for DatasetError {}

impl From<io::Error> for DatasetError {
    fn from(err: io::Error) -> Self {
        DatasetError::Io(err)
    }
}

impl From<prost::DecodeError> for DatasetError {
    fn from(err: prost::DecodeError) -> Self {
        DatasetError::Decode(err)
    }
}

/// One stored (state, joint action) pair.
#[derive(Clone, PartialEq, Message)]
pub struct SampleRecord {
    #[prost(uint32, tag = "1")]
    pub width: u32,
    #[prost(uint32, tag = "2")]
    pub height: u32,
    /// Row-major cell codes
    #[prost(sint32, repeated, tag = "3")]
    pub cells: Vec<i32>,
    /// Target column per agent, -1 when the agent has none
    #[prost(sint32, repeated, tag = "4")]
    pub target_x: Vec<i32>,
    /// Target row per agent, -1 when the agent has none
    #[prost(sint32, repeated, tag = "5")]
    pub target_y: Vec<i32>,
    /// Action code per agent
    #[prost(uint32, repeated, tag = "6")]
    pub actions: Vec<u32>,
    #[prost(uint32, tag = "7")]
    pub tick: u32,
    #[prost(uint32, tag = "8")]
    pub episode: u32,
}

impl SampleRecord {
    pub fn from_sample(episode: usize, sample: &Sample) -> Self {
        let snapshot = &sample.snapshot;
        let (target_x, target_y) = snapshot
            .targets
            .iter()
            .map(|target| target.map_or((-1, -1), |pos| (pos.x, pos.y)))
            .unzip();
        SampleRecord {
            width: snapshot.map.width.max(0) as u32,
            height: snapshot.map.height.max(0) as u32,
            cells: snapshot.map.cells().to_vec(),
            target_x,
            target_y,
            actions: sample.actions.iter().map(|a| a.code() as u32).collect(),
            tick: snapshot.tick,
            episode: episode as u32,
        }
    }

    pub fn to_sample(&self) -> Result<Sample, DatasetError> {
        let map = Map::from_cells(self.width as i32, self.height as i32, self.cells.clone())
            .ok_or_else(|| {
                DatasetError::Format(format!(
                    "{} cells do not fill a {}x{} map",
                    self.cells.len(),
                    self.width,
                    self.height
                ))
            })?;
        if self.target_x.len() != self.target_y.len() {
            return Err(DatasetError::Format("target coordinates differ in length".to_string()));
        }
        let targets = self
            .target_x
            .iter()
            .zip(&self.target_y)
            .map(|(&x, &y)| (x >= 0 && y >= 0).then(|| Position::new(x, y)))
            .collect();
        let actions = self
            .actions
            .iter()
            .map(|&code| {
                u8::try_from(code)
                    .ok()
                    .and_then(Action::from_code)
                    .ok_or_else(|| DatasetError::Format(format!("unknown action code {}", code)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Sample {
            snapshot: GridSnapshot::new(map, targets, self.tick),
            actions,
        })
    }
}

/// Buffers accepted episodes and writes them to numbered batch files.
pub struct DatasetWriter {
    folder: PathBuf,
    flush_interval: usize,
    pending: Vec<SampleRecord>,
    pending_episodes: usize,
    next_index: usize,
}

impl DatasetWriter {
    pub fn new(folder: impl Into<PathBuf>, flush_interval: usize) -> Result<Self, DatasetError> {
        let folder = folder.into();
        if !folder.exists() {
            fs::create_dir_all(&folder)?;
        }
        let next_index = next_file_index(&folder)?;
        tracing::debug!(folder = %folder.display(), next_index, "Dataset writer ready");
        Ok(Self {
            folder,
            flush_interval: flush_interval.max(1),
            pending: Vec::new(),
            pending_episodes: 0,
            next_index,
        })
    }

    pub fn pending_episodes(&self) -> usize {
        self.pending_episodes
    }

    /// Queues `episode`; returns the written file when this completed a batch.
    pub fn push_episode(&mut self, episode: &Episode) -> Result<Option<PathBuf>, DatasetError> {
        self.pending.extend(
            episode
                .samples
                .iter()
                .map(|sample| SampleRecord::from_sample(episode.index, sample)),
        );
        self.pending_episodes += 1;

        if self.pending_episodes >= self.flush_interval {
            self.flush()
        } else {
            Ok(None)
        }
    }

    /// Writes every queued episode to a new file.
    pub fn flush(&mut self) -> Result<Option<PathBuf>, DatasetError> {
        if self.pending_episodes == 0 {
            return Ok(None);
        }

        let path = self
            .folder
            .join(format!("{}{}-{}.{}", FILE_PREFIX, self.next_index, timestamp()?, FILE_EXTENSION));

        let mut bytes = Vec::new();
        for record in &self.pending {
            write_delimited_message(&mut bytes, record)?;
        }
        fs::write(&path, &bytes)?;

        tracing::info!(
            path = %path.display(),
            episodes = self.pending_episodes,
            samples = self.pending.len(),
            "Wrote dataset file"
        );

        self.pending.clear();
        self.pending_episodes = 0;
        self.next_index += 1;
        Ok(Some(path))
    }
}

/// Stores every episode received on `episodes` until the channel closes, then
/// flushes whatever is left.
pub async fn run_writer(
    mut writer: DatasetWriter,
    mut episodes: mpsc::Receiver<Episode>,
) -> Result<usize, DatasetError> {
    let mut files = 0;
    while let Some(episode) = episodes.recv().await {
        if writer.push_episode(&episode)?.is_some() {
            files += 1;
        }
    }
    if writer.flush()?.is_some() {
        files += 1;
    }
    Ok(files)
}

/// Decodes every record of one batch file.
pub fn read_batch(path: impl AsRef<Path>) -> Result<Vec<SampleRecord>, DatasetError> {
    let bytes = fs::read(path)?;
    let mut buf = bytes.as_slice();
    let mut records = Vec::new();
    while !buf.is_empty() {
        records.push(SampleRecord::decode_length_delimited(&mut buf)?);
    }
    Ok(records)
}

fn write_delimited_message<T: Message>(out: &mut Vec<u8>, message: &T) -> Result<(), DatasetError> {
    let mut buf = Vec::new();
    message.encode(&mut buf).map_err(io::Error::from)?;

    let mut varint_buf = BytesMut::new();
    prost::encode_length_delimiter(buf.len(), &mut varint_buf).map_err(io::Error::from)?;

    out.extend_from_slice(&varint_buf);
    out.extend_from_slice(&buf);
    Ok(())
}

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]-[hour][minute][second]");

fn timestamp() -> Result<String, DatasetError> {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(TIMESTAMP_FORMAT)
        .map_err(|err| DatasetError::Format(err.to_string()))
}

/// One past the highest index among existing `data<index>-*` files.
fn next_file_index(folder: &Path) -> Result<usize, DatasetError> {
    let mut next = 0;
    for entry in fs::read_dir(folder)? {
        let name = entry?.file_name();
        let Some(rest) = name.to_str().and_then(|name| name.strip_prefix(FILE_PREFIX)) else {
            continue;
        };
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(index) = digits.parse::<usize>() {
            next = next.max(index + 1);
        }
    }
    Ok(next)
}
