use super::{
    errors::{RelResult, ReleaseError},
    state::SystemState,
};
use crate::paths::Paths;
use isahc::{
    config::{Configurable, RedirectPolicy},
    http::StatusCode,
    HttpClient,
};
use std::{path::Path, time::Duration};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub const MIN_CACHE_FREE_MB: u64 = 300;
pub const MIN_SYSTEM_FREE_MB: u64 = 150;

/// Fetches the final HTTP status of a URL.
pub trait ReleaseProbe {
    fn status(&self, url: &str) -> Result<StatusCode, isahc::Error>;
}

pub struct HttpProbe {
    client: HttpClient,
}

impl HttpProbe {
    pub fn new() -> RelResult<Self> {
        HttpClient::builder()
            .timeout(PROBE_TIMEOUT)
            .redirect_policy(RedirectPolicy::Follow)
            .build()
            .map(HttpProbe::with_client)
            .map_err(ReleaseError::HttpClient)
    }

    pub fn with_client(client: HttpClient) -> Self { HttpProbe { client } }
}

impl ReleaseProbe for HttpProbe {
    fn status(&self, url: &str) -> Result<StatusCode, isahc::Error> {
        self.client.get(url).map(|response| response.status())
    }
}

pub fn release_index_url(state: &SystemState, base_url: &str) -> String {
    fomat!((state.repo_url(base_url)) "/dists/" (state.suite) "/Release")
}

/// Whether the repository publishes the suite of `state`.
///
/// A client error status means it doesn't. Any other failure is an error.
pub fn release_exists(
    probe: &dyn ReleaseProbe,
    state: &SystemState,
    base_url: &str,
) -> RelResult<bool> {
    let url = release_index_url(state, base_url);
    info!("Accessing {}...", url);

    let status = probe.status(&url).map_err(|why| ReleaseError::Probe(url.clone(), why))?;
    info!("Response code {}", status.as_u16());

    if status.is_success() {
        Ok(true)
    } else if status.is_client_error() {
        Ok(false)
    } else {
        Err(ReleaseError::ProbeStatus(url, status))
    }
}

/// Space available to unprivileged users on the filesystem holding a path.
pub trait DiskSpace {
    fn available_bytes(&self, path: &Path) -> RelResult<u64>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Statvfs;

impl DiskSpace for Statvfs {
    fn available_bytes(&self, path: &Path) -> RelResult<u64> {
        nix::sys::statvfs::statvfs(path)
            .map(|stat| stat.blocks_available() as u64 * stat.block_size() as u64)
            .map_err(|why| ReleaseError::FreeSpace(path.to_owned(), why))
    }
}

/// Checks the apt archive cache first, then the root filesystem.
pub fn enough_free_space(disk: &dyn DiskSpace, paths: &Paths) -> RelResult<bool> {
    let checks = [
        (&paths.apt_archives, MIN_CACHE_FREE_MB, "for apt cache (/mnt/data)"),
        (&paths.system_bin, MIN_SYSTEM_FREE_MB, "in root partition"),
    ];

    for &(path, min_mb, place) in &checks {
        let available = disk.available_bytes(path)?;
        debug!("{} has {} bytes available", path.display(), available);
        if available < min_mb * 1024 * 1024 {
            error!("Need at least {} MB of free space {}", min_mb, place);
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        release::repos::DEFAULT_REPO_URL,
        testing::{FakeDisk, FakeProbe},
    };
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
    };
    use test_case::test_case;

    const MB: u64 = 1024 * 1024;

    fn state() -> SystemState { SystemState::new("testing", "wb6/stretch", "") }

    #[test]
    fn index_url() {
        assert_eq!(
            release_index_url(&state(), DEFAULT_REPO_URL),
            "http://deb.wirenboard.com/wb6/stretch/dists/testing/Release"
        );
    }

    #[test_case(200 => Some(true) ; "found")]
    #[test_case(404 => Some(false) ; "not found")]
    #[test_case(403 => Some(false) ; "forbidden")]
    #[test_case(500 => None ; "server error is an error")]
    #[test_case(304 => None ; "unfollowed redirect is an error")]
    fn classify_status(code: u16) -> Option<bool> {
        let probe = FakeProbe::new(code);
        let result = release_exists(&probe, &state(), DEFAULT_REPO_URL).ok();
        assert_eq!(probe.urls(), vec![release_index_url(&state(), DEFAULT_REPO_URL)]);
        result
    }

    #[test_case(300, 150 => true ; "exactly enough")]
    #[test_case(299, 1000 => false ; "cache too small")]
    #[test_case(1000, 149 => false ; "root too small")]
    fn free_space(cache_mb: u64, system_mb: u64) -> bool {
        let root = tempfile::tempdir().unwrap();
        let paths = Paths::under(root.path());
        let disk = FakeDisk::new(&paths, cache_mb * MB, system_mb * MB);
        enough_free_space(&disk, &paths).unwrap()
    }

    #[test]
    fn cache_checked_first() {
        let root = tempfile::tempdir().unwrap();
        let paths = Paths::under(root.path());
        let disk = FakeDisk::new(&paths, 0, 0);
        assert!(!enough_free_space(&disk, &paths).unwrap());
        assert_eq!(disk.queried(), vec![paths.apt_archives.clone()]);
    }

    #[test]
    fn statvfs_reports_space() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Statvfs.available_bytes(dir.path()).is_ok());
        assert!(Statvfs.available_bytes(Path::new("/nonexistent/wb-release")).is_err());
    }

    fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => request.extend_from_slice(&buf[..read]),
                }
            }

            let _ = write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                status_line
            );
        });

        fomat!("http://" (addr) "/")
    }

    fn local_probe() -> HttpProbe {
        HttpProbe::with_client(
            HttpClient::builder()
                .timeout(PROBE_TIMEOUT)
                .proxy(None::<isahc::http::Uri>)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn http_probe_missing_release() {
        let base = serve_once("404 Not Found");
        assert!(!release_exists(&local_probe(), &state(), &base).unwrap());
    }

    #[test]
    fn http_probe_existing_release() {
        let base = serve_once("200 OK");
        assert!(release_exists(&local_probe(), &state(), &base).unwrap());
    }

    #[test]
    fn http_probe_server_error() {
        let base = serve_once("503 Service Unavailable");
        assert!(matches!(
            release_exists(&local_probe(), &state(), &base),
            Err(ReleaseError::ProbeStatus(_, _))
        ));
    }
}
