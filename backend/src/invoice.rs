use axum::{extract::Path, http::header, response::IntoResponse, Extension};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db;
use crate::error::ApiError;
use crate::models::{Order, OrderItem};
use crate::orders::load_order_authorized;

/// Downloadable invoice for an order, as a single-page PDF.
pub async fn get_invoice(
    Extension(current): Extension<CurrentUser>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let mut conn = db::establish_connection()?;
    let (order, items) = load_order_authorized(&mut conn, order_id, &current)?;

    let pdf = render_pdf(&invoice_lines(&order, &items, &current.name));

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"invoice-{}.pdf\"", order.id),
            ),
        ],
        pdf,
    ))
}

fn invoice_lines(order: &Order, items: &[OrderItem], customer_name: &str) -> Vec<String> {
    let mut lines = vec![
        "HARVEST MARKET INVOICE".to_string(),
        String::new(),
        format!("Invoice: {}", order.transaction_id),
        format!("Order: {}", order.id),
        format!("Date: {}", order.created_at.format("%Y-%m-%d %H:%M")),
        format!("Customer: {}", customer_name),
        format!(
            "Delivery: {} on {} at {}",
            order.delivery_address, order.delivery_date, order.delivery_time
        ),
        format!("Payment: {}", order.payment_method),
        String::new(),
    ];
    for item in items {
        lines.push(format!(
            "{}  x {} @ {} = {}",
            item.product_name,
            item.quantity,
            item.unit_price,
            item.unit_price * i64::from(item.quantity)
        ));
    }
    lines.push(String::new());
    lines.push(format!("Subtotal: {}", order.subtotal));
    lines.push(format!("Delivery fee: {}", order.delivery_fee));
    lines.push(format!("Service fee: {}", order.service_fee));
    lines.push(format!("Total: {}", order.total));
    lines.push(format!("Status: {}", order.status));
    lines
}

/// Literal string escaping for PDF content streams.
fn pdf_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            _ => out.push(c),
        }
    }
    out
}

/// Writes a minimal single-page PDF (1.4, built-in Helvetica, one text
/// block). Offsets in the xref table are byte-exact, which is all a viewer
/// needs.
fn render_pdf(lines: &[String]) -> Vec<u8> {
    let mut content = String::from("BT\n/F1 11 Tf\n14 TL\n50 790 Td\n");
    for line in lines {
        content.push_str(&format!("({}) Tj\nT*\n", pdf_escape(line)));
    }
    content.push_str("ET\n");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content.len(),
            content
        ),
    ];

    let mut pdf = Vec::new();
    pdf.extend_from_slice(b"%PDF-1.4\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, body).as_bytes());
    }

    let xref_offset = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );

    pdf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_escape() {
        assert_eq!(pdf_escape("a(b)c"), "a\\(b\\)c");
        assert_eq!(pdf_escape("back\\slash"), "back\\\\slash");
        assert_eq!(pdf_escape("plain"), "plain");
    }

    #[test]
    fn test_render_pdf_structure() {
        let pdf = render_pdf(&["Total: 375".to_string()]);
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.contains("(Total: 375) Tj"));
        assert!(text.contains("/BaseFont /Helvetica"));
        assert!(text.trim_end().ends_with("%%EOF"));
    }

    #[test]
    fn test_xref_offsets_are_byte_exact() {
        let pdf = render_pdf(&["x".to_string()]);
        let text = String::from_utf8(pdf).unwrap();
        // Each xref entry must point at the "N 0 obj" it describes.
        let xref_start = text.find("xref\n").unwrap();
        let entries: Vec<&str> = text[xref_start..]
            .lines()
            .skip(3) // xref, subsection header, free entry
            .take(5)
            .collect();
        for (index, entry) in entries.iter().enumerate() {
            let offset: usize = entry[..10].parse().unwrap();
            assert!(text[offset..].starts_with(&format!("{} 0 obj", index + 1)));
        }
    }
}
