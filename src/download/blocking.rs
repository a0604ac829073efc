use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::download::interrupt::Interrupt;
use crate::download::progress::TransferProgress;
use crate::download::utils;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download interrupted")]
    Interrupted,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {0}")]
    Status(StatusCode),
    #[error("connection closed after {got} of {expected} bytes")]
    Incomplete { got: u64, expected: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub chunk_size: usize,
    /// Attempts per file, at least one.
    pub retries: u32,
    /// Keep `.part` files on failure and resume them on the next run.
    pub resume: bool,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Longest wait for the response head or for a single read of the body.
    pub read_timeout: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            chunk_size: 65_536,
            retries: 8,
            resume: false,
            retry_delay: Duration::from_secs(2),
            read_timeout: Duration::from_secs(60),
        }
    }
}

/// Something that can store a remote link at a local path.
pub trait Fetcher {
    fn fetch(&mut self, link: &str, dest: &Path) -> Result<PathBuf, DownloadError>;
}

/// Single connection downloader writing through a `.part` file.
pub struct BlockingDownloader {
    client: Client,
    options: DownloadOptions,
    interrupt: Interrupt,
    show_progress: bool,
}

impl BlockingDownloader {
    pub fn new(options: DownloadOptions, interrupt: Interrupt) -> Result<Self, DownloadError> {
        // The blocking client applies `timeout` to each read, not to the whole body.
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(options.read_timeout)
            .build()?;
        Ok(Self {
            client,
            options,
            interrupt,
            show_progress: true,
        })
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// One pass over the connection, continuing whatever `part` already holds.
    fn attempt(&self, link: &str, part: &Path, bar: &mut TransferProgress) -> Result<(), DownloadError> {
        let resume_from = if part.is_file() { fs::metadata(part)?.len() } else { 0 };
        let mut request = self.client.get(link);
        if resume_from > 0 {
            info!(resume_from, "resuming partial download");
            request = request.header(header::RANGE, format!("bytes={}-", resume_from));
        }
        let mut response = request.send()?;

        let (mut dest, mut downloaded, total) = match response.status() {
            StatusCode::PARTIAL_CONTENT if resume_from > 0 => {
                let total = response.content_length().map(|len| len + resume_from);
                let dest = OpenOptions::new().append(true).open(part)?;
                (dest, resume_from, total)
            }
            // Range not satisfiable: nothing left to fetch.
            StatusCode::RANGE_NOT_SATISFIABLE if resume_from > 0 => {
                debug!("partial file already complete");
                return Ok(());
            }
            status if status.is_success() => {
                if resume_from > 0 {
                    warn!("server ignored the range request, starting over");
                }
                (File::create(part)?, 0, response.content_length())
            }
            status => return Err(DownloadError::Status(status)),
        };
        bar.restart(downloaded, total);

        let mut buffer = vec![0; self.options.chunk_size.max(1)];
        loop {
            if self.interrupt.requested() {
                dest.sync_all()?;
                bar.abandon(downloaded);
                return Err(DownloadError::Interrupted);
            }
            let read = response.read(&mut buffer[..])?;
            if read == 0 {
                break;
            }
            dest.write_all(&buffer[..read])?;
            downloaded += read as u64;
            bar.update(downloaded);
        }
        dest.sync_all()?;

        if let Some(expected) = total {
            if downloaded < expected {
                return Err(DownloadError::Incomplete {
                    got: downloaded,
                    expected,
                });
            }
        }
        bar.finish(downloaded);
        Ok(())
    }

    fn transfer(&self, link: &str, part: &Path) -> Result<(), DownloadError> {
        let mut bar = if self.show_progress {
            TransferProgress::spinner()
        } else {
            TransferProgress::hidden()
        };
        let attempts = self.options.retries.max(1);
        let mut attempt = 1;
        loop {
            if self.interrupt.requested() {
                return Err(DownloadError::Interrupted);
            }
            match self.attempt(link, part, &mut bar) {
                Ok(()) => return Ok(()),
                Err(DownloadError::Interrupted) => return Err(DownloadError::Interrupted),
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, error = %e, "download attempt failed, retrying");
                    attempt += 1;
                    thread::sleep(self.options.retry_delay);
                }
                Err(e) => {
                    bar.abandon(part.metadata().map(|m| m.len()).unwrap_or(0));
                    return Err(e);
                }
            }
        }
    }
}

impl Fetcher for BlockingDownloader {
    fn fetch(&mut self, link: &str, dest: &Path) -> Result<PathBuf, DownloadError> {
        let part = utils::part_path(dest);
        if !self.options.resume && utils::remove_partial(dest) {
            debug!(path = %part.display(), "discarded stale partial file");
        }

        let result = {
            let _transfer = self.interrupt.transfer();
            self.transfer(link, &part)
        };
        if let Err(e) = result {
            if !self.options.resume {
                utils::remove_partial(dest);
            }
            return Err(e);
        }

        fs::rename(&part, dest)?;
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::io::BufReader;
    use std::net::TcpListener;

    /// Serves one canned response per accepted connection and reports the
    /// `Range` header each request carried.
    fn serve(responses: Vec<Vec<u8>>) -> (String, thread::JoinHandle<Vec<Option<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/video.mp4", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut ranges = Vec::new();
            for body in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut range = None;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some(v) = line.to_ascii_lowercase().strip_prefix("range: ") {
                        range = Some(v.to_string());
                    }
                }
                ranges.push(range);
                stream.write_all(&body).unwrap();
            }
            ranges
        });
        (url, handle)
    }

    fn response(status: &str, headers: &[&str], body: &[u8]) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
        for h in headers {
            out.push_str(h);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        let mut out = out.into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn downloader(options: DownloadOptions) -> BlockingDownloader {
        BlockingDownloader::new(options, Interrupt::new())
            .unwrap()
            .show_progress(false)
    }

    fn fast_retries(retries: u32, resume: bool) -> DownloadOptions {
        DownloadOptions {
            retries,
            resume,
            retry_delay: Duration::from_millis(10),
            read_timeout: Duration::from_secs(5),
            ..DownloadOptions::default()
        }
    }

    #[test]
    fn downloads_through_part_file() {
        let (url, server) = serve(vec![response(
            "200 OK",
            &["Content-Length: 11"],
            b"hello world",
        )]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");

        let path = downloader(DownloadOptions::default()).fetch(&url, &dest).unwrap();

        assert_eq!(path, dest);
        assert_eq!(fs::read(&dest).unwrap(), b"hello world");
        assert!(!utils::part_path(&dest).exists());
        assert_eq!(server.join().unwrap(), vec![None]);
    }

    #[test]
    fn resumes_existing_part_when_asked() {
        let (url, server) = serve(vec![response(
            "206 Partial Content",
            &["Content-Length: 6", "Content-Range: bytes 5-10/11"],
            b" world",
        )]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");
        fs::write(utils::part_path(&dest), b"hello").unwrap();

        downloader(fast_retries(8, true)).fetch(&url, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"hello world");
        assert_eq!(server.join().unwrap(), vec![Some("bytes=5-".to_string())]);
    }

    #[test]
    fn short_read_is_retried_from_where_it_stopped() {
        let (url, server) = serve(vec![
            response("200 OK", &["Content-Length: 11"], b"hello"),
            response(
                "206 Partial Content",
                &["Content-Length: 6", "Content-Range: bytes 5-10/11"],
                b" world",
            ),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");

        downloader(fast_retries(3, false)).fetch(&url, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"hello world");
        assert_eq!(
            server.join().unwrap(),
            vec![None, Some("bytes=5-".to_string())]
        );
    }

    #[test]
    fn full_reply_to_range_request_restarts_file() {
        let (url, server) = serve(vec![response("200 OK", &["Content-Length: 5"], b"fresh")]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");
        fs::write(utils::part_path(&dest), b"old").unwrap();

        downloader(fast_retries(1, true)).fetch(&url, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"fresh");
        assert_eq!(server.join().unwrap(), vec![Some("bytes=3-".to_string())]);
    }

    #[test]
    fn unsatisfiable_range_means_part_is_complete() {
        let (url, server) = serve(vec![response(
            "416 Range Not Satisfiable",
            &["Content-Length: 0", "Content-Range: bytes */11"],
            b"",
        )]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");
        fs::write(utils::part_path(&dest), b"hello world").unwrap();

        downloader(fast_retries(1, true)).fetch(&url, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"hello world");
        assert!(!utils::part_path(&dest).exists());
        assert_eq!(server.join().unwrap(), vec![Some("bytes=11-".to_string())]);
    }

    #[test]
    fn stale_part_is_discarded_without_resume() {
        let (url, server) = serve(vec![response("200 OK", &["Content-Length: 3"], b"new")]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");
        fs::write(utils::part_path(&dest), b"old bytes").unwrap();

        downloader(DownloadOptions::default()).fetch(&url, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new");
        assert_eq!(server.join().unwrap(), vec![None]);
    }

    #[test]
    fn failed_download_leaves_nothing_behind() {
        let (url, server) = serve(vec![
            response("503 Service Unavailable", &["Content-Length: 0"], b""),
            response("404 Not Found", &["Content-Length: 0"], b""),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");

        let err = downloader(fast_retries(2, false)).fetch(&url, &dest).unwrap_err();

        assert!(matches!(err, DownloadError::Status(StatusCode::NOT_FOUND)));
        assert!(!dest.exists());
        assert!(!utils::part_path(&dest).exists());
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn pending_interrupt_stops_before_connecting() {
        let interrupt = Interrupt::new();
        {
            let _transfer = interrupt.transfer();
            assert!(!interrupt.signal());
        }
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");
        fs::write(utils::part_path(&dest), b"half").unwrap();

        let mut d = BlockingDownloader::new(fast_retries(3, true), interrupt)
            .unwrap()
            .show_progress(false);
        let err = d.fetch("http://127.0.0.1:9/video.mp4", &dest).unwrap_err();

        assert!(matches!(err, DownloadError::Interrupted));
        assert!(!dest.exists());
        assert_eq!(fs::read(utils::part_path(&dest)).unwrap(), b"half");
    }

    #[test]
    fn interrupted_download_without_resume_removes_part() {
        let interrupt = Interrupt::new();
        {
            let _transfer = interrupt.transfer();
            interrupt.signal();
        }
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("movie.mp4");

        let mut d = BlockingDownloader::new(fast_retries(3, false), interrupt)
            .unwrap()
            .show_progress(false);
        let err = d.fetch("http://127.0.0.1:9/video.mp4", &dest).unwrap_err();

        assert!(matches!(err, DownloadError::Interrupted));
        assert!(!utils::part_path(&dest).exists());
    }
}
