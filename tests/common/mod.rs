//! In-process stand-ins for the camera, the face models and the hosted backend.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use digid::auth::{AuthProvider, Session, SessionCallback, SessionEvent, Subscription, User};
use digid::documents::{BlobStore, FileRecord, FileTable, NewFile};
use digid::storage::{KeyValueStore, MemoryStore};
use digid_vision::{
    Camera, FaceAnalysis, FaceAnalyzer, FaceBox, FaceDescriptor, MediaStream, StreamConstraints,
    DESCRIPTOR_LEN,
};
use image::RgbImage;

pub fn descriptor(fill: f32) -> FaceDescriptor {
    FaceDescriptor::new(vec![fill; DESCRIPTOR_LEN]).unwrap()
}

/// Zero descriptor moved `distance` along the first axis.
pub fn descriptor_at(distance: f32) -> FaceDescriptor {
    let mut values = vec![0.0; DESCRIPTOR_LEN];
    values[0] = distance;
    FaceDescriptor::new(values).unwrap()
}

pub struct FakeStream {
    live: Arc<AtomicBool>,
    size: (u32, u32),
}

impl FakeStream {
    pub fn new(size: (u32, u32)) -> (Self, Arc<AtomicBool>) {
        let live = Arc::new(AtomicBool::new(true));
        (
            Self {
                live: live.clone(),
                size,
            },
            live,
        )
    }
}

impl MediaStream for FakeStream {
    fn frame(&mut self) -> Result<RgbImage> {
        if !self.is_live() {
            bail!("stream stopped");
        }
        Ok(RgbImage::from_pixel(self.size.0, self.size.1, image::Rgb([90, 80, 70])))
    }

    fn stop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Camera that hands out streams and remembers each one's liveness.
#[derive(Clone, Default)]
pub struct FakeCamera {
    pub deny: Option<String>,
    pub frame_size: Option<(u32, u32)>,
    pub streams: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
    pub requests: Arc<Mutex<Vec<StreamConstraints>>>,
}

impl FakeCamera {
    pub fn denied(message: &str) -> Self {
        Self {
            deny: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn live_streams(&self) -> usize {
        self.streams
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.load(Ordering::SeqCst))
            .count()
    }

    pub fn opened_streams(&self) -> usize {
        self.streams.lock().unwrap().len()
    }
}

impl Camera for FakeCamera {
    type Stream = FakeStream;

    fn request(&mut self, constraints: &StreamConstraints) -> Result<FakeStream> {
        self.requests.lock().unwrap().push(*constraints);
        if let Some(message) = &self.deny {
            bail!("{}", message);
        }
        let size = self
            .frame_size
            .unwrap_or((constraints.ideal_width, constraints.ideal_height));
        let (stream, live) = FakeStream::new(size);
        self.streams.lock().unwrap().push(live);
        Ok(stream)
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Face(FaceDescriptor),
    NoFace,
    Fail,
    /// The analyzer panics mid-capture.
    Panic,
}

/// Analyzer that replays a fixed script, one step per capture.
#[derive(Clone, Default)]
pub struct ScriptedAnalyzer {
    steps: Arc<Mutex<VecDeque<Step>>>,
    pub seen_sizes: Arc<Mutex<Vec<(u32, u32)>>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedAnalyzer {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into_iter().collect())),
            ..Self::default()
        }
    }
}

impl FaceAnalyzer for ScriptedAnalyzer {
    fn detect_and_describe(
        &mut self,
        image: &RgbImage,
        min_confidence: f32,
    ) -> Result<Option<FaceAnalysis>> {
        assert_eq!(min_confidence, 0.5);
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_sizes.lock().unwrap().push(image.dimensions());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Face(descriptor)) => Ok(Some(FaceAnalysis {
                bbox: FaceBox {
                    x: 100.0,
                    y: 80.0,
                    width: 200.0,
                    height: 240.0,
                },
                score: 0.93,
                landmarks: vec![(0.0, 0.0); 68],
                descriptor,
            })),
            Some(Step::NoFace) => Ok(None),
            Some(Step::Fail) => Err(anyhow!("landmark model returned garbage")),
            Some(Step::Panic) => panic!("descriptor model crashed"),
            None => Err(anyhow!("analyzer script exhausted")),
        }
    }
}

#[derive(Default)]
pub struct AuthState {
    accounts: HashMap<String, (String, String)>,
    current: Option<User>,
    next_id: u32,
    subscribers: HashMap<u32, Arc<SessionCallback>>,
    next_sub: u32,
}

/// Auth backend keeping accounts in memory.
#[derive(Clone, Default)]
pub struct FakeAuth {
    pub state: Arc<Mutex<AuthState>>,
    pub sign_in_calls: Arc<AtomicUsize>,
    pub sign_ups: Arc<Mutex<Vec<(String, String)>>>,
    pub reset_emails: Arc<Mutex<Vec<(String, Option<String>)>>>,
    pub password_updates: Arc<Mutex<Vec<String>>>,
    pub user_updates: Arc<Mutex<Vec<(String, String)>>>,
    pub fail_sign_up: Option<String>,
}

impl FakeAuth {
    pub fn with_account(email: &str, password: &str) -> Self {
        let auth = Self::default();
        auth.add_account(email, password);
        auth
    }

    pub fn add_account(&self, email: &str, password: &str) -> User {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("user-{}", state.next_id);
        state
            .accounts
            .insert(email.to_string(), (id.clone(), password.to_string()));
        User {
            id,
            email: email.to_string(),
        }
    }

    pub fn sign_in_as(&self, email: &str, password: &str) {
        self.sign_in(email, password).unwrap();
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().unwrap().subscribers.len()
    }

    fn notify(&self, event: SessionEvent) {
        let subscribers: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .subscribers
            .values()
            .cloned()
            .collect();
        for callback in subscribers {
            callback(&event);
        }
    }
}

impl AuthProvider for FakeAuth {
    fn current_user(&self) -> Result<Option<User>> {
        Ok(self.state.lock().unwrap().current.clone())
    }

    fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let session = {
            let mut state = self.state.lock().unwrap();
            let user = match state.accounts.get(email) {
                Some((id, stored)) if stored == password => User {
                    id: id.clone(),
                    email: email.to_string(),
                },
                _ => bail!("Invalid login credentials"),
            };
            state.current = Some(user.clone());
            Session {
                user,
                access_token: "token".to_string(),
            }
        };
        self.notify(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    fn sign_up(&self, email: &str, password: &str, redirect_to: &str) -> Result<User> {
        if let Some(message) = &self.fail_sign_up {
            bail!("{}", message);
        }
        if self.state.lock().unwrap().accounts.contains_key(email) {
            bail!("User already registered");
        }
        self.sign_ups
            .lock()
            .unwrap()
            .push((email.to_string(), redirect_to.to_string()));
        Ok(self.add_account(email, password))
    }

    fn sign_out(&self) -> Result<()> {
        self.state.lock().unwrap().current = None;
        self.notify(SessionEvent::SignedOut);
        Ok(())
    }

    fn reset_password(&self, email: &str, redirect_to: Option<&str>) -> Result<()> {
        self.reset_emails
            .lock()
            .unwrap()
            .push((email.to_string(), redirect_to.map(str::to_string)));
        Ok(())
    }

    fn update_password(&self, new_password: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(user) = state.current.clone() else {
            bail!("Auth session missing!");
        };
        if let Some(account) = state.accounts.get_mut(&user.email) {
            account.1 = new_password.to_string();
        }
        self.password_updates
            .lock()
            .unwrap()
            .push(new_password.to_string());
        Ok(())
    }

    fn update_user(&self, full_name: &str, phone: &str) -> Result<User> {
        let Some(user) = self.state.lock().unwrap().current.clone() else {
            bail!("Auth session missing!");
        };
        self.user_updates
            .lock()
            .unwrap()
            .push((full_name.to_string(), phone.to_string()));
        self.notify(SessionEvent::UserUpdated(user.clone()));
        Ok(user)
    }

    fn on_session_change(&self, callback: SessionCallback) -> Subscription {
        let id = {
            let mut state = self.state.lock().unwrap();
            state.next_sub += 1;
            let id = state.next_sub;
            state.subscribers.insert(id, Arc::new(callback));
            id
        };
        let state = self.state.clone();
        Subscription::new(move || {
            state.lock().unwrap().subscribers.remove(&id);
        })
    }
}

/// Bucket keeping blobs in memory.
#[derive(Clone, Default)]
pub struct FakeBlobs {
    pub blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub signed: Arc<Mutex<Vec<(String, u64)>>>,
    pub fail_upload: bool,
    pub fail_remove: bool,
}

impl BlobStore for FakeBlobs {
    fn upload(&self, path: &str, data: &[u8], _content_type: &str) -> Result<()> {
        if self.fail_upload {
            bail!("The object exceeded the maximum allowed size");
        }
        self.blobs
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn create_signed_url(&self, path: &str, expires_in_secs: u64) -> Result<String> {
        self.signed
            .lock()
            .unwrap()
            .push((path.to_string(), expires_in_secs));
        Ok(format!(
            "/object/sign/user-documents/{}?token=t{}",
            path, expires_in_secs
        ))
    }

    fn remove(&self, paths: &[&str]) -> Result<()> {
        if self.fail_remove {
            bail!("storage unavailable");
        }
        let mut blobs = self.blobs.lock().unwrap();
        for path in paths {
            blobs.remove(*path);
        }
        Ok(())
    }
}

/// File metadata table with a controllable clock.
#[derive(Clone)]
pub struct FakeFiles {
    pub rows: Arc<Mutex<Vec<FileRecord>>>,
    pub clock: Arc<Mutex<DateTime<Utc>>>,
    pub fail_insert: bool,
}

impl Default for FakeFiles {
    fn default() -> Self {
        Self {
            rows: Arc::default(),
            clock: Arc::new(Mutex::new(
                Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            )),
            fail_insert: false,
        }
    }
}

impl FileTable for FakeFiles {
    fn insert(&self, file: NewFile) -> Result<FileRecord> {
        if self.fail_insert {
            bail!("new row violates row-level security policy");
        }
        let uploaded_at = {
            let mut clock = self.clock.lock().unwrap();
            *clock += Duration::minutes(1);
            *clock
        };
        let mut rows = self.rows.lock().unwrap();
        let record = FileRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: file.user_id,
            file_name: file.file_name,
            file_size: file.file_size,
            file_type: file.file_type,
            storage_path: file.storage_path,
            uploaded_at,
        };
        rows.push(record.clone());
        Ok(record)
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<FileRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.rows.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }
}

/// Memory store whose writes fail for keys starting with `fail_prefix`.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    pub fail_prefix: Option<String>,
}

impl FlakyStore {
    pub fn failing(prefix: &str) -> Self {
        Self {
            fail_prefix: Some(prefix.to_string()),
            ..Self::default()
        }
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        if let Some(prefix) = &self.fail_prefix {
            if key.starts_with(prefix.as_str()) {
                bail!("disk full");
            }
        }
        self.inner.put(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}
