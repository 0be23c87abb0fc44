use std::collections::HashMap;

use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref, TextStr};

use crate::convert::{PageContent, RasterImage};
use crate::geometry::PageGeometry;

const PAGE_XOBJECT: Name<'static> = Name(b"P0");

/// Incrementally assembled output document, one page per converted page.
pub(crate) struct DocumentBuilder {
    pdf: Pdf,
    next_id: i32,
    catalog_id: Ref,
    pages_id: Ref,
    page_ids: Vec<Ref>,
}

impl DocumentBuilder {
    pub(crate) fn new() -> Self {
        let mut builder = Self {
            pdf: Pdf::new(),
            next_id: 1,
            catalog_id: Ref::new(1),
            pages_id: Ref::new(1),
            page_ids: Vec::new(),
        };
        builder.catalog_id = builder.alloc();
        builder.pages_id = builder.alloc();
        builder
    }

    fn alloc(&mut self) -> Ref {
        let r = Ref::new(self.next_id);
        self.next_id += 1;
        r
    }

    pub(crate) fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Append a page sized and placed per `geometry`; `content` is drawn into
    /// the content rectangle.
    pub(crate) fn add_page(&mut self, geometry: &PageGeometry, content: PageContent) {
        let xobject = match content {
            PageContent::Vector { chunk, root } => self.embed_chunk(&chunk, root),
            PageContent::Raster(image) => self.embed_raster(&image),
        };

        let page_id = self.alloc();
        let content_id = self.alloc();

        let [x, y, w, h] = geometry.placement_pt();
        let mut content = Content::new();
        content.save_state();
        content.transform([w, 0.0, 0.0, h, x, y]);
        content.x_object(PAGE_XOBJECT);
        content.restore_state();
        let raw = content.finish();
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(raw.as_slice(), 6);
        self.pdf
            .stream(content_id, &compressed)
            .filter(Filter::FlateDecode);

        let (page_w, page_h) = geometry.page_pt();
        {
            let mut page = self.pdf.page(page_id);
            page.media_box(Rect::new(0.0, 0.0, page_w, page_h))
                .parent(self.pages_id)
                .contents(content_id);
            page.resources().x_objects().pair(PAGE_XOBJECT, xobject);
        }

        self.page_ids.push(page_id);
    }

    /// Move a foreign chunk's objects into our id space.
    fn embed_chunk(&mut self, chunk: &pdf_writer::Chunk, root: Ref) -> Ref {
        let new_root = self.alloc();
        let mut map = HashMap::from([(root, new_root)]);
        let next_id = &mut self.next_id;
        let renumbered = chunk.renumber(|old| {
            *map.entry(old).or_insert_with(|| {
                let r = Ref::new(*next_id);
                *next_id += 1;
                r
            })
        });
        self.pdf.extend(&renumbered);
        new_root
    }

    fn embed_raster(&mut self, image: &RasterImage) -> Ref {
        let xobj_ref = self.alloc();
        let compressed_rgb = miniz_oxide::deflate::compress_to_vec_zlib(&image.rgb, 6);

        let smask_ref = image.alpha.as_ref().map(|alpha| {
            let compressed_alpha = miniz_oxide::deflate::compress_to_vec_zlib(alpha, 6);
            let mask_ref = self.alloc();
            let mut mask = self.pdf.image_xobject(mask_ref, &compressed_alpha);
            mask.filter(Filter::FlateDecode);
            mask.width(image.width as i32);
            mask.height(image.height as i32);
            mask.color_space().device_gray();
            mask.bits_per_component(8);
            mask_ref
        });

        let mut xobj = self.pdf.image_xobject(xobj_ref, &compressed_rgb);
        xobj.filter(Filter::FlateDecode);
        xobj.width(image.width as i32);
        xobj.height(image.height as i32);
        xobj.color_space().device_rgb();
        xobj.bits_per_component(8);
        if let Some(mask_ref) = smask_ref {
            xobj.s_mask(mask_ref);
        }
        xobj_ref
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        let info_id = self.alloc();
        self.pdf
            .document_info(info_id)
            .producer(TextStr(concat!("sceneprint-pdf ", env!("CARGO_PKG_VERSION"))));
        self.pdf.catalog(self.catalog_id).pages(self.pages_id);
        let count = self.page_ids.len() as i32;
        self.pdf
            .pages(self.pages_id)
            .kids(self.page_ids.iter().copied())
            .count(count);
        self.pdf.finish()
    }
}
