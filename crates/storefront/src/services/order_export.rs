//! Spreadsheet copy of a placed order.
//!
//! One sheet named `Pedido`: a heading, the order number and date, the
//! company block, then one row per item and a closing total row.

use rust_xlsxwriter::{Format, Workbook};
use tracing::{debug, instrument};
use vitrine_core::{CompanySettings, OrderSummary};

use crate::error::Result;

/// Name of the worksheet holding the order.
pub const SHEET_NAME: &str = "Pedido";

/// First row of the item table, below the column headings.
const FIRST_ITEM_ROW: u32 = 12;

const ITEM_HEADINGS: [&str; 5] = ["Código", "Produto", "Quantidade", "Preço Unit.", "Total"];
const COLUMN_WIDTHS: [f64; 5] = [15.0, 40.0, 12.0, 12.0, 12.0];

/// An exported order workbook.
#[derive(Debug, Clone)]
pub struct OrderExport {
    /// `Pedido_<order number>.xlsx`
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// File name an order is exported under.
#[must_use]
pub fn file_name(order_number: i64) -> String {
    format!("Pedido_{order_number}.xlsx")
}

/// Build the workbook for `summary`, headed with `company`'s details.
///
/// # Errors
///
/// Returns [`crate::AppError::Export`] if the workbook cannot be written.
#[instrument(skip_all, fields(order_number = summary.order_number))]
pub fn export_order(summary: &OrderSummary, company: &CompanySettings) -> Result<OrderExport> {
    let bold = Format::new().set_bold();
    let money = Format::new().set_num_format("0.00");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;
    for (col, width) in (0_u16..).zip(COLUMN_WIDTHS) {
        sheet.set_column_width(col, width)?;
    }

    sheet.write_string_with_format(0, 0, "PEDIDO DE COMPRA", &bold)?;
    sheet.write_string(2, 0, "Número do Pedido:")?;
    // Order numbers are far below 2^53.
    #[allow(clippy::cast_precision_loss)]
    sheet.write_number(2, 1, summary.order_number as f64)?;
    sheet.write_string(3, 0, "Data:")?;
    sheet.write_string(3, 1, summary.date.format("%d/%m/%Y").to_string())?;

    sheet.write_string(5, 0, "Empresa:")?;
    sheet.write_string(5, 1, &company.name)?;
    sheet.write_string(6, 0, "CNPJ:")?;
    sheet.write_string(6, 1, &company.tax_id)?;
    sheet.write_string(7, 0, "Endereço:")?;
    sheet.write_string(7, 1, &company.address)?;

    sheet.write_string_with_format(9, 0, "ITENS DO PEDIDO", &bold)?;
    for (col, heading) in (0_u16..).zip(ITEM_HEADINGS) {
        sheet.write_string_with_format(FIRST_ITEM_ROW - 1, col, heading, &bold)?;
    }

    let mut row = FIRST_ITEM_ROW;
    for item in &summary.items {
        sheet.write_string(row, 0, &item.product.code)?;
        sheet.write_string(row, 1, &item.product.name)?;
        sheet.write_number(row, 2, item.quantity)?;
        sheet.write_number_with_format(row, 3, item.product.price.to_f64(), &money)?;
        sheet.write_number_with_format(row, 4, item.subtotal().to_f64(), &money)?;
        row += 1;
    }
    sheet.write_string_with_format(row, 3, "Total:", &bold)?;
    sheet.write_number_with_format(row, 4, summary.total.to_f64(), &money)?;

    let bytes = workbook.save_to_buffer()?;
    debug!(size = bytes.len(), items = summary.items.len(), "Order workbook written");
    Ok(OrderExport {
        file_name: file_name(summary.order_number),
        bytes,
    })
}
