//! ffmpeg-backed encoder and capability probe.
//!
//! The encoder runs ffmpeg as a subprocess reading the captured input in
//! real time and muxing to stdout. Stdout is cut into chunks on the
//! requested timeslice. Stopping writes `q` to ffmpeg's stdin so the
//! container trailer is still written.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{EncodedChunk, Encoder, EncoderEvent, EncoderFactory};
use crate::codec::mime::parse_mime;
use crate::codec::CapabilityProbe;
use crate::settings::EncoderOptions;
use crate::source::MediaStream;

/// Used when the settings leave the mimetype unset
pub const DEFAULT_MIME: &str = r#"video/webm; codecs="vp9","opus""#;

const READ_BUFFER: usize = 64 * 1024;

fn video_encoder(token: &str) -> Option<&'static str> {
    match token {
        "vp9" => Some("libvpx-vp9"),
        "avc1" => Some("libx264"),
        "vp8" => Some("libvpx"),
        "av1" => Some("libaom-av1"),
        "hev1" => Some("libx265"),
        _ => None,
    }
}

fn audio_encoder(token: &str) -> Option<&'static str> {
    match token {
        "opus" => Some("libopus"),
        "pcm" => Some("pcm_s16le"),
        "mp4a" => Some("aac"),
        _ => None,
    }
}

fn muxer(container: &str) -> Option<&'static str> {
    match container {
        "webm" => Some("webm"),
        "ogg" => Some("ogg"),
        "mp4" => Some("mp4"),
        "x-matroska" => Some("matroska"),
        _ => None,
    }
}

fn container_accepts(container: &str, token: &str) -> bool {
    match container {
        "webm" => matches!(token, "vp8" | "vp9" | "av1" | "opus"),
        "ogg" => matches!(token, "opus"),
        "mp4" => matches!(token, "avc1" | "hev1" | "av1" | "vp9" | "mp4a" | "opus"),
        "x-matroska" => true,
        _ => false,
    }
}

fn default_codecs(container: &str) -> &'static [&'static str] {
    match container {
        "webm" => &["vp9", "opus"],
        "ogg" => &["opus"],
        "mp4" => &["avc1", "mp4a"],
        "x-matroska" => &["avc1", "opus"],
        _ => &[],
    }
}

/// What ffmpeg has to do for one mimetype
#[derive(Debug, Clone, PartialEq, Eq)]
struct EncodePlan {
    video: Option<&'static str>,
    audio: Option<&'static str>,
    muxer: &'static str,
    /// Non-seekable mp4 output needs fragments
    fragmented: bool,
}

impl EncodePlan {
    fn for_mime(mime: &str) -> Result<Self> {
        let (container, tokens) = parse_mime(mime);
        let muxer = muxer(&container).ok_or_else(|| anyhow!("Unsupported container: {}", container))?;
        let audio_only = mime.trim_start().starts_with("audio/");

        let tokens: Vec<String> = if tokens.is_empty() {
            default_codecs(&container)
                .iter()
                .filter(|token| !(audio_only && video_encoder(token).is_some()))
                .map(|token| token.to_string())
                .collect()
        } else {
            tokens
        };

        let mut plan = Self {
            video: None,
            audio: None,
            muxer,
            fragmented: container == "mp4",
        };

        for token in &tokens {
            if let Some(encoder) = video_encoder(token) {
                plan.video = Some(encoder);
            } else if let Some(encoder) = audio_encoder(token) {
                plan.audio = Some(encoder);
            } else {
                bail!("Unknown codec token: {}", token);
            }

            if !container_accepts(&container, token) {
                bail!("Container {} cannot carry {}", container, token);
            }
        }

        if plan.video.is_none() && plan.audio.is_none() {
            bail!("No codecs for mimetype: {}", mime);
        }

        Ok(plan)
    }

    fn args(&self, input: &str, options: &EncoderOptions) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-nostats", "-re", "-i"]
            .iter()
            .map(|arg| arg.to_string())
            .collect();
        args.push(input.to_string());

        match self.video {
            Some(encoder) => {
                args.extend(["-c:v".to_string(), encoder.to_string()]);
                if let Some(bps) = options.video_bits_per_second {
                    args.extend(["-b:v".to_string(), bps.to_string()]);
                }
                if let Some(interval) = options.video_key_frame_interval {
                    args.extend([
                        "-force_key_frames".to_string(),
                        format!("expr:gte(t,n_forced*{})", interval.as_secs()),
                    ]);
                }
            }
            None => args.push("-vn".to_string()),
        }

        match self.audio {
            Some(encoder) => {
                args.extend(["-c:a".to_string(), encoder.to_string()]);
                if let Some(bps) = options.audio_bits_per_second {
                    args.extend(["-b:a".to_string(), bps.to_string()]);
                }
            }
            None => args.push("-an".to_string()),
        }

        if self.fragmented {
            args.extend([
                "-movflags".to_string(),
                "frag_keyframe+empty_moov+default_base_moof".to_string(),
            ]);
        }

        args.extend(["-f".to_string(), self.muxer.to_string(), "pipe:1".to_string()]);
        args
    }
}

/// Locates the ffmpeg binary: `FFMPEG_PATH`, then common install
/// locations, then `PATH`.
pub fn find_ffmpeg() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os("FFMPEG_PATH").map(PathBuf::from) {
        if path.exists() {
            return Ok(path);
        }
        warn!("FFMPEG_PATH points at a missing file: {}", path.display());
    }

    let binary = if cfg!(target_os = "windows") {
        "ffmpeg.exe"
    } else {
        "ffmpeg"
    };

    let candidates = [
        PathBuf::from("/opt/homebrew/bin/ffmpeg"),
        PathBuf::from("/usr/local/bin/ffmpeg"),
        PathBuf::from("/usr/bin/ffmpeg"),
        PathBuf::from("/snap/bin/ffmpeg"),
    ];

    let from_path = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).map(|dir| dir.join(binary)).collect::<Vec<_>>())
        .unwrap_or_default();

    candidates
        .into_iter()
        .chain(from_path)
        .find(|path| path.exists())
        .inspect(|path| debug!("Found ffmpeg at: {}", path.display()))
        .ok_or_else(|| anyhow!("ffmpeg not found. Install it or set FFMPEG_PATH"))
}

/// Capability predicate backed by the local ffmpeg build
#[derive(Debug, Clone, Default)]
pub struct FfmpegProbe {
    encoders: HashSet<String>,
    muxers: HashSet<String>,
}

impl FfmpegProbe {
    pub fn new<E, M>(encoders: E, muxers: M) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            encoders: encoders.into_iter().map(Into::into).collect(),
            muxers: muxers.into_iter().map(Into::into).collect(),
        }
    }

    /// Query `ffmpeg -encoders` and `ffmpeg -muxers`
    pub fn detect(ffmpeg: &Path) -> Result<Self> {
        let encoders = parse_listing(&run_listing(ffmpeg, "-encoders")?);
        let muxers = parse_listing(&run_listing(ffmpeg, "-muxers")?);

        info!(
            "ffmpeg capabilities: {} encoders, {} muxers",
            encoders.len(),
            muxers.len()
        );

        Ok(Self { encoders, muxers })
    }
}

impl CapabilityProbe for FfmpegProbe {
    fn is_type_supported(&self, mime: &str) -> bool {
        let (_, tokens) = parse_mime(mime);
        if tokens.is_empty() {
            return false;
        }

        let has_video = tokens.iter().any(|token| video_encoder(token).is_some());
        let kind = if has_video { "video/" } else { "audio/" };
        if !mime.starts_with(kind) {
            return false;
        }

        match EncodePlan::for_mime(mime) {
            Ok(plan) => {
                self.muxers.contains(plan.muxer)
                    && plan.video.map_or(true, |encoder| self.encoders.contains(encoder))
                    && plan.audio.map_or(true, |encoder| self.encoders.contains(encoder))
            }
            Err(_) => false,
        }
    }
}

fn run_listing(ffmpeg: &Path, flag: &str) -> Result<String> {
    let output = std::process::Command::new(ffmpeg)
        .args(["-hide_banner", flag])
        .output()
        .with_context(|| format!("Failed to run {} {}", ffmpeg.display(), flag))?;

    if !output.status.success() {
        bail!(
            "ffmpeg {} failed: {}",
            flag,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Names from an ffmpeg listing: the second column after the `--` separator
fn parse_listing(text: &str) -> HashSet<String> {
    text.lines()
        .skip_while(|line| !line.trim_start().starts_with("--"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .flat_map(|names| names.split(','))
        .map(str::to_string)
        .collect()
}

/// Builds [`FfmpegEncoder`]s; the mimetype is validated up front
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    ffmpeg: PathBuf,
}

impl FfmpegEncoderFactory {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn create(&self, stream: MediaStream, options: &EncoderOptions) -> Result<Box<dyn Encoder>> {
        let mime_type = options
            .mime_type
            .clone()
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        let plan = EncodePlan::for_mime(&mime_type)
            .with_context(|| format!("Cannot encode {}", mime_type))?;

        Ok(Box::new(FfmpegEncoder {
            ffmpeg: self.ffmpeg.clone(),
            args: plan.args(&stream.input, options),
            stream,
            mime_type,
            stdin: None,
        }))
    }
}

/// One ffmpeg process per session
pub struct FfmpegEncoder {
    ffmpeg: PathBuf,
    args: Vec<String>,
    stream: MediaStream,
    mime_type: String,
    stdin: Option<ChildStdin>,
}

#[async_trait::async_trait]
impl Encoder for FfmpegEncoder {
    async fn start(&mut self, timeslice: Option<Duration>) -> Result<mpsc::Receiver<EncoderEvent>> {
        if self.stdin.is_some() {
            bail!("Encoder already started");
        }

        info!("Starting ffmpeg for {}: {}", self.stream.label, self.args.join(" "));

        let mut child = Command::new(&self.ffmpeg)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start ffmpeg for {}", self.stream.label))?;

        let stdout = child.stdout.take().context("Failed to capture ffmpeg stdout")?;
        let stderr = child.stderr.take().context("Failed to capture ffmpeg stderr")?;
        self.stdin = child.stdin.take();

        let (tx, rx) = mpsc::channel(64);
        tx.send(EncoderEvent::Started)
            .await
            .map_err(|_| anyhow!("Encoder event receiver dropped"))?;

        tokio::spawn(forward_stderr(stderr, self.stream.label.clone()));

        let label = self.stream.label.clone();
        tokio::spawn(async move {
            pump(stdout, timeslice, &tx).await;

            match child.wait().await {
                Ok(status) if status.success() => debug!("ffmpeg finished for {}", label),
                Ok(status) => warn!("ffmpeg for {} exited with {}", label, status),
                Err(e) => error!("Failed to wait for ffmpeg: {}", e),
            }

            let _ = tx.send(EncoderEvent::Stopped).await;
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut stdin) = self.stdin.take() else {
            debug!("ffmpeg for {} is not running", self.stream.label);
            return Ok(());
        };

        info!("Stopping ffmpeg for {}", self.stream.label);

        if let Err(e) = stdin.write_all(b"q").await {
            debug!("ffmpeg already gone: {}", e);
        }
        let _ = stdin.flush().await;

        Ok(())
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Read encoder output and forward it as chunks.
///
/// With a timeslice, whatever accumulated is flushed on every tick.
/// Without one, the whole output is delivered once stdout closes.
async fn pump<R>(mut stdout: R, timeslice: Option<Duration>, tx: &mpsc::Sender<EncoderEvent>)
where
    R: AsyncRead + Unpin,
{
    let started = Instant::now();
    let mut pending = Vec::new();
    let mut buf = vec![0u8; READ_BUFFER];
    let mut ticker = timeslice
        .filter(|slice| !slice.is_zero())
        .map(tokio::time::interval);

    loop {
        let read = match ticker.as_mut() {
            Some(ticker) => tokio::select! {
                read = stdout.read(&mut buf) => read,
                _ = ticker.tick() => {
                    if !pending.is_empty() && !emit(tx, &mut pending, started).await {
                        return;
                    }
                    continue;
                }
            },
            None => stdout.read(&mut buf).await,
        };

        match read {
            Ok(0) => break,
            Ok(n) => pending.extend_from_slice(&buf[..n]),
            Err(e) => {
                warn!("Failed to read encoder output: {}", e);
                break;
            }
        }
    }

    if !pending.is_empty() {
        emit(tx, &mut pending, started).await;
    }
}

async fn emit(tx: &mpsc::Sender<EncoderEvent>, pending: &mut Vec<u8>, started: Instant) -> bool {
    let chunk = EncodedChunk::new(std::mem::take(pending), started.elapsed().as_millis() as u64);
    tx.send(EncoderEvent::Data(chunk)).await.is_ok()
}

async fn forward_stderr(stderr: ChildStderr, label: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!("ffmpeg [{}]: {}", label, line);
    }
}
