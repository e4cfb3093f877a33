use super::table::{HeaderTable, TableKind};
use super::{
    decode_string, uvarint, HeaderField, INDEXED, INDEXED_PREFIX, LITERAL_INCREMENTAL,
    LITERAL_NOT_INDEXED, LITERAL_PREFIX, STRING_PREFIX, SUBSTITUTION_PREFIX,
};
use crate::h2::error::{Error, Result};

/// Header block decoder for one direction of a connection
#[derive(Debug)]
pub struct Decoder {
    table: HeaderTable,
    disposed: bool,
}

impl Decoder {
    pub fn new(kind: TableKind, max_size: usize) -> Self {
        Decoder {
            table: HeaderTable::new(kind, max_size),
            disposed: false,
        }
    }

    pub fn table(&self) -> &HeaderTable {
        &self.table
    }

    /// Decode a complete header block
    ///
    /// The result is the part of the previous header set that survived the
    /// block (in table order) followed by the headers emitted by the block,
    /// in block order.
    pub fn decompress(&mut self, block: &[u8]) -> Result<Vec<HeaderField>> {
        if self.disposed {
            return Err(Error::Compression("decoder disposed".to_string()));
        }

        // entries referenced at block start; eviction does not remove them
        let mut working: Vec<(u64, HeaderField)> = self
            .table
            .entries()
            .filter(|e| e.referenced)
            .map(|e| (e.id, e.field.clone()))
            .collect();
        let mut emitted = Vec::new();

        let mut pos = 0;
        while pos < block.len() {
            let tag = block[pos];
            if tag & INDEXED != 0 {
                let (index, used) = uvarint::decode(&block[pos..], INDEXED_PREFIX)?;
                pos += used;
                let index = index as usize;
                let entry = self.table.get(index).ok_or_else(|| {
                    Error::Compression(format!(
                        "indexed entry {} not in table of {}",
                        index,
                        self.table.len()
                    ))
                })?;
                let (id, referenced) = (entry.id, entry.referenced);
                if referenced {
                    self.table.set_referenced(index, false);
                    working.retain(|(wid, _)| *wid != id);
                } else {
                    emitted.push(entry.field.clone());
                    self.table.set_referenced(index, true);
                }
            } else if tag & 0xE0 == LITERAL_NOT_INDEXED {
                let (field, next) = self.read_literal(block, pos, LITERAL_PREFIX)?;
                pos = next;
                emitted.push(field);
            } else if tag & 0xE0 == LITERAL_INCREMENTAL {
                let (field, next) = self.read_literal(block, pos, LITERAL_PREFIX)?;
                pos = next;
                self.table.insert(field.clone());
                emitted.push(field);
            } else {
                let (name, next) = self.read_name(block, pos, SUBSTITUTION_PREFIX)?;
                let (target, used) = uvarint::decode(&block[next..], STRING_PREFIX)?;
                let (value, next) = decode_string(block, next + used)?;
                pos = next;
                let target = target as usize;
                if target >= self.table.len() {
                    return Err(Error::Compression(format!(
                        "substituted entry {} not in table of {}",
                        target,
                        self.table.len()
                    )));
                }
                let field = HeaderField { name, value };
                self.table.substitute(target, field.clone());
                emitted.push(field);
            }
        }

        Ok(working
            .into_iter()
            .map(|(_, field)| field)
            .chain(emitted)
            .collect())
    }

    /// Drop all table state; later calls to `decompress` fail
    pub fn dispose(&mut self) {
        self.table.clear();
        self.disposed = true;
    }

    fn read_literal(&self, block: &[u8], pos: usize, prefix: u8) -> Result<(HeaderField, usize)> {
        let (name, next) = self.read_name(block, pos, prefix)?;
        let (value, next) = decode_string(block, next)?;
        Ok((HeaderField { name, value }, next))
    }

    fn read_name(&self, block: &[u8], pos: usize, prefix: u8) -> Result<(String, usize)> {
        let (name_index, used) = uvarint::decode(&block[pos..], prefix)?;
        let next = pos + used;
        if name_index == 0 {
            return decode_string(block, next);
        }

        let slot = name_index as usize - 1;
        let entry = self.table.get(slot).ok_or_else(|| {
            Error::Compression(format!(
                "name index {} not in table of {}",
                name_index,
                self.table.len()
            ))
        })?;
        Ok((entry.field.name.clone(), next))
    }
}
