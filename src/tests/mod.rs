mod classify;
mod readdir;

use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, atomic::AtomicBool, atomic::Ordering};

use rustc_hash::FxHashMap;

use crate::{Body, FsError, MountOptions, NodeKind, ObsFsGeneric, Transport};

/// Transport serving canned responses and recording every request.
///
/// Keys are the API path with query, i.e. the URL minus scheme and host.
#[derive(Clone, Default)]
pub struct MockTransport(Arc<MockInner>);

#[derive(Default)]
struct MockInner {
    responses: Mutex<FxHashMap<String, Vec<u8>>>,
    gets: Mutex<Vec<String>>,
    puts: Mutex<Vec<(String, Vec<u8>)>>,
    deletes: Mutex<Vec<String>>,
    put_reply: Mutex<Option<Vec<u8>>>,
    delete_fails: AtomicBool,
}

fn api_part(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.find('/').map_or("/", |idx| &rest[idx..])
}

impl MockTransport {
    pub fn respond(&self, api_path: &str, body: &str) {
        self.0.responses.lock().unwrap().insert(api_path.to_string(), body.as_bytes().to_vec());
    }

    pub fn forget(&self, api_path: &str) {
        self.0.responses.lock().unwrap().remove(api_path);
    }

    pub fn reply_to_put(&self, body: &str) {
        *self.0.put_reply.lock().unwrap() = Some(body.as_bytes().to_vec());
    }

    pub fn fail_deletes(&self) {
        self.0.delete_fails.store(true, Ordering::Relaxed);
    }

    pub fn gets(&self) -> Vec<String> {
        self.0.gets.lock().unwrap().clone()
    }

    pub fn puts(&self) -> Vec<(String, Vec<u8>)> {
        self.0.puts.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.0.deletes.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str) -> Result<Body, FsError> {
        let path = api_part(url).to_string();
        self.0.gets.lock().unwrap().push(path.clone());
        match self.0.responses.lock().unwrap().get(&path) {
            Some(body) => Ok(Box::new(Cursor::new(body.clone()))),
            None => Err(FsError::Transport(format!("{path}: HTTP 404"))),
        }
    }

    fn put(&self, url: &str, body: &mut dyn Read, _len: u64) -> Result<Body, FsError> {
        let mut data = Vec::new();
        body.read_to_end(&mut data).map_err(FsError::from)?;
        self.0.puts.lock().unwrap().push((api_part(url).to_string(), data));
        let reply = self
            .0
            .put_reply
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| b"<status code=\"ok\"/>".to_vec());
        Ok(Box::new(Cursor::new(reply)))
    }

    fn delete(&self, url: &str) -> Result<(), FsError> {
        let path = api_part(url).to_string();
        self.0.deletes.lock().unwrap().push(path.clone());
        if self.0.delete_fails.load(Ordering::Relaxed) {
            return Err(FsError::Transport(format!("{path}: HTTP 403")));
        }
        Ok(())
    }
}

pub fn test_options() -> MountOptions {
    MountOptions { user: "alice".to_string(), pass: "secret".to_string(), host: String::new() }
}

pub fn engine(mock: &MockTransport) -> ObsFsGeneric<MockTransport> {
    ObsFsGeneric::with_transport(mock.clone(), test_options()).unwrap()
}

/// Enumerate a directory into (name, kind) pairs.
pub fn ls(fs: &ObsFsGeneric<MockTransport>, path: &str) -> Vec<(String, NodeKind)> {
    let mut out = Vec::new();
    let mut sink = |name: &str, kind: NodeKind| out.push((name.to_string(), kind));
    fs.readdir(path, Some(&mut sink)).unwrap();
    out
}

pub fn names(entries: &[(String, NodeKind)]) -> Vec<&str> {
    entries.iter().map(|(name, _)| name.as_str()).collect()
}

#[test]
fn mock_url_stripping() {
    assert_eq!(api_part("https://api.opensuse.org/build/proj"), "/build/proj");
    assert_eq!(api_part("https://api.opensuse.org/build/p/_result?repository=r&arch=a"), "/build/p/_result?repository=r&arch=a");
    assert_eq!(api_part("https://api.opensuse.org"), "/");
}

#[test]
fn engine_is_shareable_across_threads() {
    let mock = MockTransport::default();
    mock.respond("/build", r#"<directory><entry name="home:alice"/></directory>"#);
    let fs = Arc::new(engine(&mock));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let fs = Arc::clone(&fs);
            std::thread::spawn(move || fs.getattr("/build/home:alice").map(|st| st.kind))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), Ok(NodeKind::Dir));
    }
}
