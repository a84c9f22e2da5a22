//! ModelSet / DataSet — binds a row cursor to a `DataModel` and produces
//! the serialized response body. `DataSet` is the narrow cursor interface;
//! `InMemoryDataSet` is the only implementation so far, since every
//! `Dialect` query in this crate fetches eagerly through `sqlx`
//! rather than streaming row-by-row.

use async_trait::async_trait;

use crate::domain::datamodel::{DataModel, Row};
use crate::domain::error::{Message, OinoError};
use crate::infrastructure::codec::{self, ContentType};

#[async_trait]
pub trait DataSet: Send {
    fn is_empty(&self) -> bool;
    fn is_eof(&self) -> bool;
    async fn next(&mut self) -> Result<bool, OinoError>;
    fn get_row(&self) -> &Row;
}

pub struct InMemoryDataSet {
    rows: Vec<Row>,
    cursor: usize,
    started: bool,
}

impl InMemoryDataSet {
    pub fn new(rows: Vec<Row>) -> Self {
        InMemoryDataSet { rows, cursor: 0, started: false }
    }
}

#[async_trait]
impl DataSet for InMemoryDataSet {
    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn is_eof(&self) -> bool {
        self.started && self.cursor >= self.rows.len()
    }

    async fn next(&mut self) -> Result<bool, OinoError> {
        if !self.started {
            self.started = true;
        } else {
            self.cursor += 1;
        }
        Ok(self.cursor < self.rows.len())
    }

    fn get_row(&self) -> &Row {
        &self.rows[self.cursor]
    }
}

pub struct ModelSet<'a> {
    model: &'a DataModel,
    dataset: Box<dyn DataSet>,
}

impl<'a> ModelSet<'a> {
    pub fn new(model: &'a DataModel, dataset: Box<dyn DataSet>) -> Self {
        ModelSet { model, dataset }
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Serialize every remaining row to `content_type`. Consumes the
    /// cursor to completion.
    pub async fn serialize(&mut self, content_type: ContentType) -> Result<(String, Vec<Message>), OinoError> {
        match content_type {
            ContentType::Json => self.serialize_json().await,
            ContentType::Csv => self.serialize_csv().await,
            ContentType::FormData => self.serialize_formdata().await,
            ContentType::UrlEncode => self.serialize_urlencode().await,
            ContentType::Html => Err(OinoError::request_shape("html responses are not produced here; delegate to a template renderer")),
        }
    }

    async fn row_cells(&mut self, content_type: ContentType) -> Result<Vec<Vec<(String, Option<String>)>>, OinoError> {
        let mut rows_out = Vec::new();
        while self.dataset.next().await? {
            let row = self.dataset.get_row();
            let oinoid = self.model.row_oinoid(row)?;
            let mut cells = vec![(self.model.oinoid_field_name().to_string(), Some(oinoid))];
            for (idx, field) in self.model.fields().iter().enumerate() {
                let serialized = field.serialize_cell(&row[idx], content_type)?;
                cells.push((field.name().to_string(), serialized));
            }
            rows_out.push(cells);
        }
        Ok(rows_out)
    }

    async fn serialize_json(&mut self) -> Result<(String, Vec<Message>), OinoError> {
        let rows = self.row_cells(ContentType::Json).await?;
        let mut out = String::from("[");
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push('{');
            let mut first = true;
            for (name, value) in row {
                let Some(value) = value else { continue };
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(&format!("\"{name}\":{value}"));
            }
            out.push('}');
        }
        out.push(']');
        Ok((out, Vec::new()))
    }

    async fn serialize_csv(&mut self) -> Result<(String, Vec<Message>), OinoError> {
        let rows = self.row_cells(ContentType::Csv).await?;
        let mut out = String::new();
        let mut header_written = false;
        for row in rows {
            if !header_written {
                let header: Vec<String> = row.iter().map(|(name, _)| name.clone()).collect();
                out.push_str(&header.join(","));
                out.push_str("\r\n");
                header_written = true;
            }
            let values: Vec<String> = row.into_iter().map(|(_, v)| v.unwrap_or_default()).collect();
            out.push_str(&values.join(","));
            out.push_str("\r\n");
        }
        Ok((out, Vec::new()))
    }

    async fn serialize_formdata(&mut self) -> Result<(String, Vec<Message>), OinoError> {
        const BOUNDARY: &str = "oino-boundary";
        let rows = self.row_cells(ContentType::FormData).await?;
        let mut messages = Vec::new();
        if rows.len() > 1 {
            messages.push(Message::warning("multipart/form-data responses only represent a single row; extra rows were dropped"));
        }
        let mut out = String::new();
        if let Some(row) = rows.into_iter().next() {
            for (name, value) in row {
                let Some(value) = value else { continue };
                out.push_str(&format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"));
            }
            out.push_str(&format!("--{BOUNDARY}--\r\n"));
        }
        Ok((out, messages))
    }

    async fn serialize_urlencode(&mut self) -> Result<(String, Vec<Message>), OinoError> {
        let rows = self.row_cells(ContentType::UrlEncode).await?;
        let mut messages = Vec::new();
        if rows.len() > 1 {
            messages.push(Message::warning("urlencoded responses only represent a single row cleanly; emitting all rows concatenated"));
        }
        let mut parts = Vec::new();
        for row in rows {
            for (name, value) in row {
                let Some(value) = value else { continue };
                parts.push(format!("{}={}", codec::encode(&name, ContentType::UrlEncode, crate::domain::field::FieldKind::String), value));
            }
        }
        Ok((parts.join("&"), messages))
    }
}
