//! In-memory fakes of the host seams.
//!
//! [`FakeSessionApi`] answers from scripted responses and records every
//! call with a `tokio::time::Instant`, so paused-clock tests can assert
//! backoff timing. [`FakeHost`] records every effect the runtime requests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use instances_core::Pose;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::errors::ApiError;
use crate::host::{
    Clock, CreateSessionRequest, CreatedSession, CurrentSession, Host, SessionApi,
    SessionDetails, SessionLookup,
};

/// Home world reported by [`FakeHost::default`].
pub const HOME_WORLD: &str = "w-home";

/// Details of a live session named after its id.
pub fn details(id: &str, world_id: &str) -> SessionDetails {
    SessionDetails {
        id: id.to_owned(),
        name: format!("{id} name"),
        world_id: world_id.to_owned(),
        world_image_url: None,
    }
}

/// A created session named after its id.
pub fn created(id: &str) -> CreatedSession {
    CreatedSession {
        id: id.to_owned(),
        name: format!("{id} name"),
        region: "0".to_owned(),
    }
}

/// One recorded API call.
#[derive(Clone, Debug)]
pub enum ApiCall {
    /// `session_details(id)`.
    Details {
        /// Session looked up.
        session_id: String,
        /// When the call was made.
        at: Instant,
    },
    /// `create_session(request)`.
    Create {
        /// Request sent.
        request: CreateSessionRequest,
        /// When the call was made.
        at: Instant,
    },
}

/// Scripted [`SessionApi`].
///
/// Lookups first consume responses queued with [`push_lookup`], then answer
/// from sessions added with [`insert_session`], and otherwise report
/// not-found. Creates consume [`push_create`] responses and fail once those
/// run out.
///
/// [`push_lookup`]: FakeSessionApi::push_lookup
/// [`insert_session`]: FakeSessionApi::insert_session
/// [`push_create`]: FakeSessionApi::push_create
#[derive(Default)]
pub struct FakeSessionApi {
    scripted: Mutex<HashMap<String, VecDeque<Result<SessionLookup, ApiError>>>>,
    live: Mutex<HashMap<String, SessionDetails>>,
    creates: Mutex<VecDeque<Result<CreatedSession, ApiError>>>,
    calls: Mutex<Vec<ApiCall>>,
}

impl FakeSessionApi {
    /// Create an API with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response for lookups of `session_id`.
    pub fn push_lookup(&self, session_id: &str, response: Result<SessionLookup, ApiError>) {
        self.scripted
            .lock()
            .entry(session_id.to_owned())
            .or_default()
            .push_back(response);
    }

    /// Make a session permanently findable.
    pub fn insert_session(&self, details: SessionDetails) {
        let _ = self.live.lock().insert(details.id.clone(), details);
    }

    /// Queue one response for `create_session`.
    pub fn push_create(&self, response: Result<CreatedSession, ApiError>) {
        self.creates.lock().push_back(response);
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    /// Times of the lookups of `session_id`.
    pub fn lookup_times(&self, session_id: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ApiCall::Details { session_id: id, at } if id == session_id => Some(*at),
                _ => None,
            })
            .collect()
    }

    /// Number of lookups of `session_id`.
    pub fn lookup_count(&self, session_id: &str) -> usize {
        self.lookup_times(session_id).len()
    }

    /// Times of the create calls.
    pub fn create_times(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ApiCall::Create { at, .. } => Some(*at),
                ApiCall::Details { .. } => None,
            })
            .collect()
    }

    /// Requests of the create calls.
    pub fn create_requests(&self) -> Vec<CreateSessionRequest> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                ApiCall::Create { request, .. } => Some(request.clone()),
                ApiCall::Details { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl SessionApi for FakeSessionApi {
    async fn session_details(&self, session_id: &str) -> Result<SessionLookup, ApiError> {
        self.calls.lock().push(ApiCall::Details {
            session_id: session_id.to_owned(),
            at: Instant::now(),
        });
        if let Some(response) = self
            .scripted
            .lock()
            .get_mut(session_id)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }
        Ok(match self.live.lock().get(session_id) {
            Some(details) => SessionLookup::Found(details.clone()),
            None => SessionLookup::NotFound(format!("instance {session_id} not found")),
        })
    }

    async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, ApiError> {
        self.calls.lock().push(ApiCall::Create {
            request: request.clone(),
            at: Instant::now(),
        });
        self.creates
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Rejected("no create response scripted".into())))
    }
}

/// Recording [`Host`].
pub struct FakeHost {
    home_world: String,
    current: Mutex<Option<CurrentSession>>,
    pose: Mutex<Option<Pose>>,
    joins: Mutex<Vec<(String, String)>>,
    offline_loads: Mutex<Vec<String>>,
    notices: Mutex<Vec<(String, String)>>,
    teleports: Mutex<Vec<Pose>>,
    relaxed_content: Mutex<bool>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new(HOME_WORLD)
    }
}

impl FakeHost {
    /// Host whose home world is `home_world`. Not in a session, not movable.
    pub fn new(home_world: &str) -> Self {
        Self {
            home_world: home_world.to_owned(),
            current: Mutex::new(None),
            pose: Mutex::new(None),
            joins: Mutex::new(Vec::new()),
            offline_loads: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            teleports: Mutex::new(Vec::new()),
            relaxed_content: Mutex::new(false),
        }
    }

    /// Set the reported current session.
    pub fn set_current_session(&self, current: Option<CurrentSession>) {
        *self.current.lock() = current;
    }

    /// Shorthand: report session `id` in world `w`, or no session.
    pub fn set_current(&self, id: Option<&str>) {
        self.set_current_session(id.map(|id| CurrentSession {
            session_id: id.to_owned(),
            world_id: "w".to_owned(),
            name: "S".to_owned(),
        }));
    }

    /// Set the reported pose (`None` means not freely movable).
    pub fn set_pose(&self, pose: Option<Pose>) {
        *self.pose.lock() = pose;
    }

    /// Join directives issued, as `(session_id, world_id)`.
    pub fn joins(&self) -> Vec<(String, String)> {
        self.joins.lock().clone()
    }

    /// Offline worlds loaded.
    pub fn offline_loads(&self) -> Vec<String> {
        self.offline_loads.lock().clone()
    }

    /// Notices shown, as `(title, message)`.
    pub fn notices(&self) -> Vec<(String, String)> {
        self.notices.lock().clone()
    }

    /// Teleport targets.
    pub fn teleports(&self) -> Vec<Pose> {
        self.teleports.lock().clone()
    }

    /// Whether the relaxed content policy was applied.
    pub fn relaxed_content_applied(&self) -> bool {
        *self.relaxed_content.lock()
    }
}

impl Host for FakeHost {
    fn set_join_target(&self, session_id: &str, world_id: &str) {
        self.joins
            .lock()
            .push((session_id.to_owned(), world_id.to_owned()));
    }

    fn load_offline_world(&self, world_id: &str) {
        self.offline_loads.lock().push(world_id.to_owned());
    }

    fn home_world_id(&self) -> String {
        self.home_world.clone()
    }

    fn show_notice(&self, title: &str, message: &str) {
        self.notices
            .lock()
            .push((title.to_owned(), message.to_owned()));
    }

    fn current_session(&self) -> Option<CurrentSession> {
        self.current.lock().clone()
    }

    fn participant_pose(&self) -> Option<Pose> {
        *self.pose.lock()
    }

    fn teleport(&self, pose: &Pose) {
        self.teleports.lock().push(*pose);
    }

    fn apply_relaxed_content_policy(&self) {
        *self.relaxed_content.lock() = true;
    }
}

/// Manually driven [`Clock`].
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: TimeDelta) {
        *self.now.lock() += delta;
    }

    /// Jump to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
pub(crate) use harness::TestHarness;
