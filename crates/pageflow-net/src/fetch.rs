//! Fetching
//!
//! The engine never performs I/O itself. Loads are handed to a host
//! `Fetcher`, and completion is reported back to the engine later.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::{NetError, ResourceType};

/// Why a fetch is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Regular load (preload, lazy or immediate)
    Normal,
    /// Low-priority speculative load after page load
    Prefetch,
    /// Background refresh of a cached copy that was already served
    Revalidate,
}

/// A load handed to the host
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub resource_type: ResourceType,
    pub mode: FetchMode,
}

impl FetchRequest {
    pub fn new(url: &str, resource_type: ResourceType, mode: FetchMode) -> Self {
        Self {
            url: url.to_string(),
            resource_type,
            mode,
        }
    }
}

/// Host-side fetch primitive.
///
/// `fetch` only starts the load; an `Err` means it could not even be
/// started (refused, offline). Completion arrives through the engine.
pub trait Fetcher {
    fn fetch(&mut self, request: &FetchRequest) -> Result<(), NetError>;
}

/// Fetcher that records requests instead of issuing them.
///
/// Clones share the same log, so a host (or a test) can keep one handle and
/// give the other to the engine. URLs marked with `refuse` fail to start.
#[derive(Debug, Clone, Default)]
pub struct RecordingFetcher {
    log: Rc<RefCell<Vec<FetchRequest>>>,
    refused: Rc<RefCell<HashSet<String>>>,
}

impl RecordingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later fetch of `url` fail to start
    pub fn refuse(&self, url: &str) {
        self.refused.borrow_mut().insert(url.to_string());
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.log.borrow().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.log.borrow().iter().map(|r| r.url.clone()).collect()
    }

    /// Number of fetches issued for `url`
    pub fn count(&self, url: &str) -> usize {
        self.log.borrow().iter().filter(|r| r.url == url).count()
    }

    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}

impl Fetcher for RecordingFetcher {
    fn fetch(&mut self, request: &FetchRequest) -> Result<(), NetError> {
        if self.refused.borrow().contains(&request.url) {
            return Err(NetError::Refused(request.url.clone()));
        }
        tracing::debug!("Fetch {:?} {}", request.mode, request.url);
        self.log.borrow_mut().push(request.clone());
        Ok(())
    }
}
