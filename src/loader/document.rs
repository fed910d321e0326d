use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use super::records::{self, RecordValues};
use super::{IdRefs, ImportOptions, LoadError};
use crate::store::{Session, SqlValue};

/// 正在解析的 `<field>`
struct PendingField {
    name: String,
    reference: Option<String>,
    text: String,
}

/// 导入 XML 数据文档
///
/// 支持任意层级下的 `<record model=".." id="..">`（子元素 `<field name=".." [ref=".."]>`）
/// 和 `<delete model=".." id=".."/>`；根元素（`<odoo>`、`<data>` 等）不做限制。
pub fn import_document(
    session: &mut dyn Session,
    module: &str,
    content: &str,
    mut id_refs: Option<&mut IdRefs>,
    options: ImportOptions,
) -> Result<(), LoadError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut record: Option<RecordValues> = None;
    let mut field: Option<PendingField> = None;
    let mut saw_root = false;
    let mut count = 0usize;

    loop {
        let position = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|source| LoadError::Xml { position, source })?;

        match event {
            Event::Start(e) => {
                saw_root = true;
                match e.name().as_ref() {
                    b"record" => record = Some(start_record(&e, position)?),
                    b"field" => {
                        if record.is_none() {
                            return Err(malformed("<field> outside of <record>"));
                        }
                        field = Some(start_field(&e, position)?);
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                saw_root = true;
                match e.name().as_ref() {
                    b"record" => {
                        let empty = start_record(&e, position)?;
                        records::write_record(session, module, &empty, id_refs.as_deref_mut(), options)?;
                        count += 1;
                    }
                    b"field" => {
                        let Some(current) = record.as_mut() else {
                            return Err(malformed("<field> outside of <record>"));
                        };
                        let pending = start_field(&e, position)?;
                        current
                            .values
                            .push(finish_field(session, module, pending)?);
                    }
                    b"delete" => {
                        let model = attribute(&e, "model", position)?
                            .ok_or_else(|| malformed("<delete> needs a model"))?;
                        let xml_id = attribute(&e, "id", position)?
                            .ok_or_else(|| malformed("<delete> needs an id"))?;
                        records::delete_record(session, module, &model, &xml_id)?;
                    }
                    _ => {}
                }
            }
            Event::Text(text) => {
                if let Some(pending) = field.as_mut() {
                    let unescaped = text.unescape().map_err(|e| LoadError::Xml {
                        position,
                        source: e.into(),
                    })?;
                    pending.text.push_str(&unescaped);
                }
            }
            Event::CData(data) => {
                if let Some(pending) = field.as_mut() {
                    pending
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"field" => {
                    if let (Some(pending), Some(current)) = (field.take(), record.as_mut()) {
                        current
                            .values
                            .push(finish_field(session, module, pending)?);
                    }
                }
                b"record" => {
                    if let Some(done) = record.take() {
                        records::write_record(session, module, &done, id_refs.as_deref_mut(), options)?;
                        count += 1;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(malformed("document has no root element"));
    }

    debug!("Imported {} record(s) for module {}", count, module);
    Ok(())
}

fn malformed(message: &str) -> LoadError {
    LoadError::MalformedDocument(message.to_string())
}

fn attribute(e: &BytesStart<'_>, name: &str, position: u64) -> Result<Option<String>, LoadError> {
    read_attribute(e, name).map_err(|source| LoadError::Xml { position, source })
}

fn read_attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, quick_xml::Error> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn start_record(e: &BytesStart<'_>, position: u64) -> Result<RecordValues, LoadError> {
    let model =
        attribute(e, "model", position)?.ok_or_else(|| malformed("<record> needs a model"))?;
    Ok(RecordValues {
        model,
        xml_id: attribute(e, "id", position)?,
        values: Vec::new(),
    })
}

fn start_field(e: &BytesStart<'_>, position: u64) -> Result<PendingField, LoadError> {
    let name = attribute(e, "name", position)?.ok_or_else(|| malformed("<field> needs a name"))?;
    Ok(PendingField {
        name,
        reference: attribute(e, "ref", position)?,
        text: String::new(),
    })
}

fn finish_field(
    session: &mut dyn Session,
    module: &str,
    pending: PendingField,
) -> Result<(String, SqlValue), LoadError> {
    let value = match pending.reference {
        Some(xml_id) => SqlValue::Integer(records::resolve_xml_id(session, module, &xml_id)?),
        None if pending.text.is_empty() => SqlValue::Null,
        None => SqlValue::Text(pending.text),
    };
    Ok((pending.name, value))
}
