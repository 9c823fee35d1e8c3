//! Shopping list aggregation and document rendering.
//!
//! A user's shopping list is the sum of ingredient amounts over every recipe in
//! their cart, one line per ingredient.

use printpdf::{IndirectFontRef, Mm, PdfDocument, PdfDocumentReference};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::config::ExportConfig;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
// 1pt = 0.3528mm, with 1.2 line spacing
const PT_TO_MM: f32 = 0.3528;
const LINE_SPACING: f32 = 1.2;

// The PDF base-14 fonts only cover Latin-1; ingredient names are often Cyrillic
const DEFAULT_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

/// Sums amounts per ingredient over the user's cart, ordered by ingredient name.
pub async fn fetch_shopping_list(db: &SqlitePool, user_id: i64) -> Result<Vec<ShoppingListItem>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT i.name, i.measurement_unit, SUM(ri.amount) AS amount
        FROM shopping_cart sc
        JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = ?1
        GROUP BY i.id, i.name, i.measurement_unit
        ORDER BY i.name_folded, i.measurement_unit
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ShoppingListItem {
            name: row.get("name"),
            measurement_unit: row.get("measurement_unit"),
            amount: row.get("amount"),
        })
        .collect())
}

/// Title, blank, numbered items, blank, title.
pub fn document_lines(title: &str, items: &[ShoppingListItem]) -> Vec<String> {
    let mut lines = Vec::with_capacity(items.len() + 4);
    lines.push(title.to_string());
    lines.push(String::new());
    for (n, item) in items.iter().enumerate() {
        lines.push(format!("{}) {} - {}, {}", n + 1, item.name, item.amount, item.measurement_unit));
    }
    lines.push(String::new());
    lines.push(title.to_string());
    lines
}

pub fn render_text(title: &str, items: &[ShoppingListItem]) -> String {
    let mut out = document_lines(title, items).join("\n");
    out.push('\n');
    out
}

pub fn render_csv(items: &[ShoppingListItem]) -> String {
    let mut out = String::from("Ingredient,Amount,Unit\n");
    for item in items {
        out.push_str(&format!(
            "\"{}\",{},\"{}\"\n",
            escape_csv(&item.name),
            item.amount,
            escape_csv(&item.measurement_unit)
        ));
    }
    out
}

fn escape_csv(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '"' => vec!['"', '"'],
            c if c.is_control() => vec![' '],
            c => vec![c],
        })
        .collect()
}

/// Renders the list on A4 pages, starting a new page whenever the current one is full.
pub fn render_pdf(cfg: &ExportConfig, items: &[ShoppingListItem]) -> anyhow::Result<Vec<u8>> {
    let lines = document_lines(&cfg.title, items);
    let (doc, first_page, first_layer) =
        PdfDocument::new(cfg.title.as_str(), Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
    let font = load_font(&doc, cfg)?;

    let line_height = cfg.font_size * PT_TO_MM * LINE_SPACING;
    let usable = PAGE_HEIGHT_MM - 2.0 * cfg.margin_mm;
    let lines_per_page = ((usable / line_height).floor() as usize).max(1);

    let mut layer = doc.get_page(first_page).get_layer(first_layer);
    for (i, line) in lines.iter().enumerate() {
        let slot = i % lines_per_page;
        if i > 0 && slot == 0 {
            let (page, page_layer) = doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
            layer = doc.get_page(page).get_layer(page_layer);
        }
        if line.is_empty() {
            continue;
        }
        // PDF origin is bottom-left; lines flow down from the top margin
        let y = PAGE_HEIGHT_MM - cfg.margin_mm - (slot as f32 + 1.0) * line_height;
        layer.use_text(line.as_str(), cfg.font_size, Mm(cfg.margin_mm), Mm(y), &font);
    }

    doc.save_to_bytes().map_err(|e| anyhow::anyhow!("failed to render PDF: {:?}", e))
}

fn load_font(doc: &PdfDocumentReference, cfg: &ExportConfig) -> anyhow::Result<IndirectFontRef> {
    if let Some(path) = cfg.font_path.as_deref() {
        let file = std::fs::File::open(path)?;
        return doc.add_external_font(file).map_err(|e| anyhow::anyhow!("failed to load font {}: {:?}", path, e));
    }
    doc.add_external_font(DEFAULT_FONT).map_err(|e| anyhow::anyhow!("failed to load bundled font: {:?}", e))
}
