// src/sheet.rs
//
// Decodes an uploaded spreadsheet (xlsx/xls via calamine, csv via the csv
// crate) into rows of canonical-field → Cell, matched by the Portuguese
// header labels of the reference helpdesk export. Everything downstream
// works on `Row`; the decoder types never leak past this module.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use thiserror::Error;

use crate::normalize::Cell;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("unsupported file type '{0}' (expected .xlsx, .xls or .csv)")]
    UnsupportedExtension(String),
    #[error("could not decode spreadsheet: {0}")]
    Decode(String),
    #[error("spreadsheet has no recognizable header row")]
    UnknownHeader,
    #[error("spreadsheet contains no data rows")]
    EmptyFile,
}

/// Canonical ticket fields, one per logical spreadsheet column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    TicketId,
    ClientName,
    Subject,
    Technician,
    PrimaryCategory,
    SecondaryCategory,
    Contact,
    ArrivalDate,
    DepartureDate,
    CompletionDate,
    Workstation,
    PauseReason,
    Sector,
    Status,
    TicketType,
    Service,
    Description,
    BusinessHours,
    ExternalService,
    StartDate,
    EndDate,
    TotalServiceTime,
}

/// Header label → field, as exported by the reference helpdesk (pt-BR).
/// Matching is order-independent and trims surrounding whitespace.
const HEADER_LABELS: [(&str, Field); 22] = [
    ("Ticket", Field::TicketId),
    ("Cliente", Field::ClientName),
    ("Assunto", Field::Subject),
    ("Técnico", Field::Technician),
    ("Categoria primária", Field::PrimaryCategory),
    ("Categoria secundária", Field::SecondaryCategory),
    ("contato", Field::Contact),
    ("Data chegada", Field::ArrivalDate),
    ("Data saida", Field::DepartureDate),
    ("Data de finalização", Field::CompletionDate),
    ("Mesa de trabalho", Field::Workstation),
    ("Motivo de pausa do ticket", Field::PauseReason),
    ("setor", Field::Sector),
    ("Status", Field::Status),
    ("Tipo de ticket", Field::TicketType),
    ("Atendimento", Field::Service),
    ("Descrição", Field::Description),
    ("Atendimento em horário comercial?", Field::BusinessHours),
    ("Atendimento externo?", Field::ExternalService),
    ("Data inicial", Field::StartDate),
    ("Data final", Field::EndDate),
    ("Tempo total de atendimento", Field::TotalServiceTime),
];

fn field_for_label(label: &str) -> Option<Field> {
    let wanted = label.trim().to_lowercase();
    HEADER_LABELS
        .iter()
        .find(|(l, _)| l.to_lowercase() == wanted)
        .map(|(_, f)| *f)
}

/// One data row: canonical field → cell. Columns absent from the file
/// simply read as `Cell::Empty`.
#[derive(Debug, Clone, Default)]
pub struct Row(HashMap<Field, Cell>);

impl Row {
    pub fn get(&self, field: Field) -> &Cell {
        self.0.get(&field).unwrap_or(&Cell::Empty)
    }

    pub fn set(&mut self, field: Field, cell: Cell) {
        self.0.insert(field, cell);
    }

    pub fn is_blank(&self) -> bool {
        self.0.values().all(|c| matches!(c, Cell::Empty))
    }
}

pub fn allowed_file(filename: &str) -> bool {
    matches!(
        extension(filename).as_deref(),
        Some("xlsx") | Some("xls") | Some("csv")
    )
}

fn extension(filename: &str) -> Option<String> {
    filename.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

/// Decodes the uploaded bytes into canonical rows. File-level problems
/// (bad extension, undecodable content, no known header, zero data rows)
/// fail here, before anything touches the database.
pub fn parse(filename: &str, bytes: &[u8]) -> Result<Vec<Row>, SheetError> {
    match extension(filename).as_deref() {
        Some("xlsx") | Some("xls") => parse_workbook(bytes),
        Some("csv") => parse_csv(bytes),
        other => Err(SheetError::UnsupportedExtension(
            other.unwrap_or("").to_string(),
        )),
    }
}

fn parse_workbook(bytes: &[u8]) -> Result<Vec<Row>, SheetError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| SheetError::Decode(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SheetError::EmptyFile)?
        .map_err(|e| SheetError::Decode(e.to_string()))?;

    let mut rows_iter = range.rows();
    let header = rows_iter.next().ok_or(SheetError::EmptyFile)?;
    let columns = map_header(header.iter().map(data_to_cell))?;

    let rows: Vec<Row> = rows_iter
        .map(|r| build_row(&columns, r.iter().map(data_to_cell)))
        .filter(|r| !r.is_blank())
        .collect();
    if rows.is_empty() {
        return Err(SheetError::EmptyFile);
    }
    Ok(rows)
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<Row>, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let header = reader
        .headers()
        .map_err(|e| SheetError::Decode(e.to_string()))?
        .clone();
    let columns = map_header(header.iter().map(|h| Cell::Text(h.to_string())))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SheetError::Decode(e.to_string()))?;
        let row = build_row(
            &columns,
            record.iter().map(|v| {
                if v.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(v.to_string())
                }
            }),
        );
        if !row.is_blank() {
            rows.push(row);
        }
    }
    if rows.is_empty() {
        return Err(SheetError::EmptyFile);
    }
    Ok(rows)
}

/// Column index → field for every header cell we recognize. A file where
/// nothing matches is the wrong shape, not an empty export.
fn map_header(cells: impl Iterator<Item = Cell>) -> Result<Vec<(usize, Field)>, SheetError> {
    let columns: Vec<(usize, Field)> = cells
        .enumerate()
        .filter_map(|(i, c)| match c {
            Cell::Text(label) => field_for_label(&label).map(|f| (i, f)),
            _ => None,
        })
        .collect();
    if columns.is_empty() {
        return Err(SheetError::UnknownHeader);
    }
    Ok(columns)
}

fn build_row(columns: &[(usize, Field)], cells: impl Iterator<Item = Cell>) -> Row {
    let cells: Vec<Cell> = cells.collect();
    let mut row = Row::default();
    for &(idx, field) in columns {
        if let Some(cell) = cells.get(idx) {
            if !matches!(cell, Cell::Empty) {
                row.set(field, cell.clone());
            }
        }
    }
    row
}

fn data_to_cell(d: &Data) -> Cell {
    match d {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(x) if x.is_duration() => d
            .as_duration()
            .map(|dur| Cell::DurationSecs(dur.num_milliseconds() as f64 / 1000.0))
            .unwrap_or(Cell::Empty),
        Data::DateTime(_) | Data::DateTimeIso(_) => {
            d.as_datetime().map(Cell::DateTime).unwrap_or(Cell::Empty)
        }
        Data::DurationIso(_) => d
            .as_duration()
            .map(|dur| Cell::DurationSecs(dur.num_milliseconds() as f64 / 1000.0))
            .unwrap_or(Cell::Empty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize;

    const CSV_SAMPLE: &str = "\
Ticket,Cliente,Técnico,Tempo total de atendimento,Atendimento externo?,Data de finalização
1001,Acme,Joana,1:30:00,Sim,2025-03-10 09:00:00
1002, acme ,Pedro,N/A,não,2025-03-12 14:00:00
";

    #[test]
    fn csv_rows_decode_by_label() {
        let rows = parse("export.csv", CSV_SAMPLE.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            normalize::text(rows[0].get(Field::TicketId)),
            Some("1001".into())
        );
        assert_eq!(normalize::duration_hours(rows[0].get(Field::TotalServiceTime)), 1.5);
        assert_eq!(normalize::tri_state(rows[0].get(Field::ExternalService)), Some(true));
        assert_eq!(normalize::tri_state(rows[1].get(Field::ExternalService)), Some(false));
        assert_eq!(normalize::duration_hours(rows[1].get(Field::TotalServiceTime)), 0.0);
    }

    #[test]
    fn header_is_order_independent_and_trim_tolerant() {
        let csv = "\
 Cliente , Ticket ,Tempo total de atendimento
Acme,1001,2:00
";
        let rows = parse("x.csv", csv.as_bytes()).unwrap();
        assert_eq!(
            normalize::text(rows[0].get(Field::ClientName)),
            Some("Acme".into())
        );
        assert_eq!(normalize::duration_hours(rows[0].get(Field::TotalServiceTime)), 2.0);
    }

    #[test]
    fn unknown_columns_are_ignored() {
        let csv = "\
Ticket,Coluna Misteriosa,Cliente
1,foo,Acme
";
        let rows = parse("x.csv", csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(normalize::text(rows[0].get(Field::ClientName)), Some("Acme".into()));
    }

    #[test]
    fn unrecognized_header_fails() {
        let csv = "a,b,c\n1,2,3\n";
        assert!(matches!(
            parse("x.csv", csv.as_bytes()),
            Err(SheetError::UnknownHeader)
        ));
    }

    #[test]
    fn empty_file_fails() {
        let csv = "Ticket,Cliente\n";
        assert!(matches!(
            parse("x.csv", csv.as_bytes()),
            Err(SheetError::EmptyFile)
        ));
        let blank = "Ticket,Cliente\n,\n , \n";
        assert!(matches!(
            parse("x.csv", blank.as_bytes()),
            Err(SheetError::EmptyFile)
        ));
    }

    #[test]
    fn extension_gate() {
        assert!(allowed_file("report.XLSX"));
        assert!(allowed_file("report.csv"));
        assert!(!allowed_file("report.pdf"));
        assert!(!allowed_file("report"));
        assert!(matches!(
            parse("x.pdf", b"whatever"),
            Err(SheetError::UnsupportedExtension(_))
        ));
    }
}
