use crate::error::{Error, Result};
use crate::geometry::{PageGeometry, Size, Unit};
use crate::model::{PageDocument, SceneObject};
use crate::svg::{self, VectorDocument};

#[derive(Clone, Debug, PartialEq)]
pub struct PageInfo {
    pub id: String,
    pub size: Size,
    pub unit: Unit,
}

/// The editing engine as seen by the export pipeline.
pub trait SceneHost {
    fn page_count(&self) -> usize;

    fn page_info(&self, page: usize) -> Result<PageInfo>;

    fn page_objects(&self, page: usize) -> Result<Vec<SceneObject>>;

    fn set_page_objects(&mut self, page: usize, objects: Vec<SceneObject>) -> Result<()>;

    /// Last-resort reset used when a page cannot be restored.
    fn clear_page(&mut self, page: usize);

    fn serialize_to_vector_document(
        &self,
        page: usize,
        geometry: &PageGeometry,
    ) -> Result<VectorDocument> {
        let info = self.page_info(page)?;
        let objects = self.page_objects(page)?;
        svg::render(&objects, info.size, geometry)
    }
}

impl SceneHost for Vec<PageDocument> {
    fn page_count(&self) -> usize {
        self.len()
    }

    fn page_info(&self, page: usize) -> Result<PageInfo> {
        let doc = self.get(page).ok_or(Error::UnknownPage(page))?;
        Ok(PageInfo {
            id: doc.id.clone(),
            size: Size::new(doc.width, doc.height),
            unit: doc.unit,
        })
    }

    fn page_objects(&self, page: usize) -> Result<Vec<SceneObject>> {
        self.get(page)
            .map(|doc| doc.objects.clone())
            .ok_or(Error::UnknownPage(page))
    }

    fn set_page_objects(&mut self, page: usize, objects: Vec<SceneObject>) -> Result<()> {
        let doc = self.get_mut(page).ok_or(Error::UnknownPage(page))?;
        doc.objects = objects;
        Ok(())
    }

    fn clear_page(&mut self, page: usize) {
        if let Some(doc) = self.get_mut(page) {
            doc.objects.clear();
        }
    }
}

/// Serialized capture of one page's object graph, taken before any export
/// mutation. Replaying it is the only way a page gets its objects back.
pub struct PageSnapshot {
    page: usize,
    bytes: Vec<u8>,
}

impl PageSnapshot {
    pub fn capture<H: SceneHost + ?Sized>(host: &H, page: usize) -> Result<Self> {
        let objects = host.page_objects(page)?;
        let bytes = serde_json::to_vec(&objects).map_err(|e| Error::Snapshot(e.to_string()))?;
        Ok(Self { page, bytes })
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn replay<H: SceneHost + ?Sized>(&self, host: &mut H) -> Result<()> {
        let objects: Vec<SceneObject> =
            serde_json::from_slice(&self.bytes).map_err(|e| Error::Snapshot(e.to_string()))?;
        host.set_page_objects(self.page, objects)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    /// Replay failed and the page was cleared instead of left half-mutated.
    ForcedClear,
}

/// Mutable access to one page for the duration of an export step.
///
/// The page is restored from its snapshot by `commit_or_restore`, or on drop
/// if the transaction is abandoned through an early return or a panic.
pub struct Transaction<'h, H: SceneHost + ?Sized> {
    host: &'h mut H,
    snapshot: PageSnapshot,
    finished: bool,
}

impl<'h, H: SceneHost + ?Sized> Transaction<'h, H> {
    pub fn begin(host: &'h mut H, page: usize) -> Result<Self> {
        let snapshot = PageSnapshot::capture(host, page)?;
        log::debug!("transaction: page {page} snapshot {} bytes", snapshot.len());
        Ok(Self {
            host,
            snapshot,
            finished: false,
        })
    }

    pub fn page(&self) -> usize {
        self.snapshot.page()
    }

    pub fn host(&self) -> &H {
        &*self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut *self.host
    }

    pub fn objects(&self) -> Result<Vec<SceneObject>> {
        self.host.page_objects(self.page())
    }

    pub fn set_objects(&mut self, objects: Vec<SceneObject>) -> Result<()> {
        let page = self.page();
        self.host.set_page_objects(page, objects)
    }

    pub fn commit_or_restore(mut self) -> RestoreOutcome {
        self.finished = true;
        self.restore()
    }

    fn restore(&mut self) -> RestoreOutcome {
        let page = self.page();
        match self.snapshot.replay(&mut *self.host) {
            Ok(()) => RestoreOutcome::Restored,
            Err(e) => {
                log::error!("Restoring page {page} failed: {e}; clearing page");
                self.host.clear_page(page);
                RestoreOutcome::ForcedClear
            }
        }
    }
}

impl<H: SceneHost + ?Sized> Drop for Transaction<'_, H> {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!("Transaction for page {} abandoned, restoring", self.page());
            self.restore();
        }
    }
}
