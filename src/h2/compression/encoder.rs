use super::table::{HeaderTable, TableKind};
use super::{
    encode_string, uvarint, HeaderField, INDEXED, INDEXED_PREFIX, LITERAL_INCREMENTAL,
    LITERAL_NOT_INDEXED, LITERAL_PREFIX, LITERAL_SUBSTITUTION, STRING_PREFIX,
    SUBSTITUTION_PREFIX,
};
use crate::h2::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use tracing::trace;

/// Header block encoder for one direction of a connection
#[derive(Debug)]
pub struct Encoder {
    table: HeaderTable,
    disposed: bool,
}

impl Encoder {
    pub fn new(kind: TableKind, max_size: usize) -> Self {
        Encoder {
            table: HeaderTable::new(kind, max_size),
            disposed: false,
        }
    }

    pub fn table(&self) -> &HeaderTable {
        &self.table
    }

    /// Encode `headers` as the difference from the previous block
    ///
    /// A header with an empty name rejects the whole batch before anything
    /// is written or the table is touched.
    pub fn compress(&mut self, headers: &[HeaderField]) -> Result<Bytes> {
        if self.disposed {
            return Err(Error::Compression("encoder disposed".to_string()));
        }
        if let Some(pos) = headers.iter().position(|h| h.name.is_empty()) {
            return Err(Error::InvalidHeader(format!(
                "header {} has an empty name",
                pos
            )));
        }

        let mut buf = BytesMut::new();

        // Leading headers that are referenced entries in table order are
        // carried over without being sent; the decoder replays them first.
        let referenced: Vec<usize> = self
            .table
            .entries()
            .enumerate()
            .filter(|(_, e)| e.referenced)
            .map(|(i, _)| i)
            .collect();

        let mut carried = Vec::new();
        let mut cursor = 0;
        for header in headers {
            let found = referenced[cursor..]
                .iter()
                .position(|&i| self.table.get(i).map_or(false, |e| e.field == *header));
            match found {
                Some(offset) => {
                    carried.push(referenced[cursor + offset]);
                    cursor += offset + 1;
                }
                None => break,
            }
        }

        for &index in &referenced {
            if !carried.contains(&index) {
                self.emit_indexed(&mut buf, index);
                self.table.set_referenced(index, false);
            }
        }

        for header in &headers[carried.len()..] {
            if let Some(index) = self.table.find_exact(header, false) {
                self.emit_indexed(&mut buf, index);
                self.table.set_referenced(index, true);
                continue;
            }

            if self.table.find_exact(header, true).is_some() || header.size() > self.table.max_size()
            {
                let name_index = self.name_index(&header.name);
                self.emit_literal(&mut buf, LITERAL_NOT_INDEXED, LITERAL_PREFIX, name_index, header);
                continue;
            }

            if let Some(index) = self.table.find_name(&header.name, Some(false)) {
                trace!(index, name = %header.name, "substitution");
                uvarint::encode(
                    &mut buf,
                    index as u32 + 1,
                    SUBSTITUTION_PREFIX,
                    LITERAL_SUBSTITUTION,
                );
                uvarint::encode(&mut buf, index as u32, STRING_PREFIX, 0);
                encode_string(&mut buf, &header.value);
                self.table.substitute(index, header.clone());
                continue;
            }

            let name_index = self.name_index(&header.name);
            self.emit_literal(&mut buf, LITERAL_INCREMENTAL, LITERAL_PREFIX, name_index, header);
            self.table.insert(header.clone());
        }

        Ok(buf.freeze())
    }

    /// Drop all table state; later calls to `compress` fail
    pub fn dispose(&mut self) {
        self.table.clear();
        self.disposed = true;
    }

    fn name_index(&self, name: &str) -> u32 {
        self.table
            .find_name(name, None)
            .map_or(0, |index| index as u32 + 1)
    }

    fn emit_indexed(&self, buf: &mut BytesMut, index: usize) {
        uvarint::encode(buf, index as u32, INDEXED_PREFIX, INDEXED);
    }

    fn emit_literal(
        &self,
        buf: &mut BytesMut,
        pattern: u8,
        prefix: u8,
        name_index: u32,
        header: &HeaderField,
    ) {
        uvarint::encode(buf, name_index, prefix, pattern);
        if name_index == 0 {
            encode_string(buf, &header.name);
        }
        encode_string(buf, &header.value);
    }
}
