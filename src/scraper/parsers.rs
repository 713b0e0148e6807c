use crate::models::RawListingRow;
use crate::scraper::cleaner::{absolutize_url, clean_text, resolve_columns, resolve_external_id};
use anyhow::Result;
use scraper::{ElementRef, Html, Selector};

// ── Selectors ─────────────────────────────────────────────────────────────────

/// Listing tables are centred, but authors spell the attribute three ways.
const TABLE_SELECTOR: &str =
    "table[alignment=center], table[align=center], table[alignment=centre]";
const DESCRIPTION_LINK_SELECTOR: &str = "td.msg2 a";
const IMAGE_SELECTOR: &str = "td.msga2 img";
const OTHER_CELL_SELECTOR: &str = "td.msga2-o.pp6";
const REMAINDER_CELL_SELECTOR: &str = "td.msga2-r.pp6";

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("selector {:?}: {:?}", css, e))
}

/// Compiled selectors for the classifieds listing layout.
pub struct ListingSelectors {
    tables: Selector,
    rows: Selector,
    description_link: Selector,
    image: Selector,
    other_cells: Selector,
    remainder_cell: Selector,
    anchor: Selector,
}

/// One candidate listing row and its description link.
#[derive(Debug, Clone, Copy)]
pub struct RowNode<'a> {
    pub row: ElementRef<'a>,
    pub link: ElementRef<'a>,
}

impl ListingSelectors {
    pub fn new() -> Result<Self> {
        Ok(Self {
            tables: selector(TABLE_SELECTOR)?,
            rows: selector("tr")?,
            description_link: selector(DESCRIPTION_LINK_SELECTOR)?,
            image: selector(IMAGE_SELECTOR)?,
            other_cells: selector(OTHER_CELL_SELECTOR)?,
            remainder_cell: selector(REMAINDER_CELL_SELECTOR)?,
            anchor: selector("a")?,
        })
    }

    /// Candidate rows in document order. Rows without a description link are
    /// not listings and never show up here.
    pub fn rows<'a>(&'a self, doc: &'a Html) -> impl Iterator<Item = RowNode<'a>> + 'a {
        doc.select(&self.tables)
            .flat_map(move |table| table.select(&self.rows))
            .filter_map(move |row| {
                row.select(&self.description_link)
                    .next()
                    .map(|link| RowNode { row, link })
            })
    }

    /// Pull the raw cell values out of a row, resolving links against `origin`.
    pub fn extract_row(&self, node: &RowNode<'_>, origin: &str) -> RawListingRow {
        let href = node.link.value().attr("href");
        let description_text = clean_text(&element_text(node.link));

        let external_id =
            resolve_external_id(node.row.value().id(), href, &description_text, origin);

        let image_url = node
            .row
            .select(&self.image)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| absolutize_url(src, origin))
            .unwrap_or_default();

        let others: Vec<String> = node
            .row
            .select(&self.other_cells)
            .map(|td| self.cell_text(td))
            .collect();
        let remainder = node
            .row
            .select(&self.remainder_cell)
            .next()
            .map(|td| self.cell_text(td))
            .unwrap_or_default();
        let columns = resolve_columns(&others, &remainder);

        RawListingRow {
            external_id,
            image_url,
            description_url: href.and_then(|h| absolutize_url(h, origin)).unwrap_or_default(),
            description_text,
            model: columns.model,
            year: columns.year,
            volume: columns.volume,
            mileage: columns.mileage,
            price: columns.price,
        }
    }

    /// Text of a cell, preferring the text of its first link.
    fn cell_text(&self, td: ElementRef<'_>) -> String {
        let source = td.select(&self.anchor).next().unwrap_or(td);
        clean_text(&element_text(source))
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
