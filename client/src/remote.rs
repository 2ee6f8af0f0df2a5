use std::cell::RefCell;
use std::rc::Rc;

use gloo_net::http::{Request, Response};
use turfmap_shared::{RemoteStore, SyncAdapter, SyncError, TerritoryPatch, TerritoryRecord};

const TERRITORIES_URL: &str = "/api/territories";

/// `RemoteStore` backed by the server's `/api/territories` table.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    base_url: String,
}

impl Default for HttpRemote {
    fn default() -> Self {
        Self::new(TERRITORIES_URL)
    }
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn item_url(&self, id: &str) -> String {
        format!(
            "{}/{}",
            self.base_url,
            js_sys::encode_uri_component(id)
                .as_string()
                .unwrap_or_default()
        )
    }
}

fn transport(e: gloo_net::Error) -> SyncError {
    SyncError::Transport(format!("fetch error: {e}"))
}

fn expect_ok(resp: &Response) -> Result<(), SyncError> {
    if resp.ok() {
        Ok(())
    } else {
        Err(SyncError::Status(resp.status()))
    }
}

impl RemoteStore for HttpRemote {
    async fn select_all(&self) -> Result<Vec<TerritoryRecord>, SyncError> {
        let resp = Request::get(&self.base_url)
            .send()
            .await
            .map_err(transport)?;
        expect_ok(&resp)?;
        resp.json::<Vec<TerritoryRecord>>()
            .await
            .map_err(|e| SyncError::Decode(format!("parse error: {e}")))
    }

    async fn exists(&self, id: &str) -> Result<bool, SyncError> {
        let resp = Request::get(&self.item_url(id))
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == 404 {
            return Ok(false);
        }
        expect_ok(&resp)?;
        Ok(true)
    }

    async fn insert(&self, record: &TerritoryRecord) -> Result<(), SyncError> {
        let resp = Request::post(&self.base_url)
            .json(record)
            .map_err(transport)?
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == 409 {
            return Err(SyncError::Conflict(record.id.clone()));
        }
        expect_ok(&resp)
    }

    async fn update(&self, id: &str, patch: &TerritoryPatch) -> Result<(), SyncError> {
        let resp = Request::patch(&self.item_url(id))
            .json(patch)
            .map_err(transport)?
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == 404 {
            return Err(SyncError::Missing(id.to_string()));
        }
        expect_ok(&resp)
    }

    async fn delete(&self, id: &str) -> Result<(), SyncError> {
        let resp = Request::delete(&self.item_url(id))
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == 404 {
            return Err(SyncError::Missing(id.to_string()));
        }
        expect_ok(&resp)
    }
}

thread_local! {
    static SYNC_ADAPTER: RefCell<Option<Rc<SyncAdapter<HttpRemote>>>> = const { RefCell::new(None) };
}

/// Page-wide adapter, so the save-in-progress guard is shared by every caller.
pub fn sync_adapter() -> Rc<SyncAdapter<HttpRemote>> {
    SYNC_ADAPTER.with(|slot| {
        slot.borrow_mut()
            .get_or_insert_with(|| Rc::new(SyncAdapter::new(HttpRemote::default())))
            .clone()
    })
}
