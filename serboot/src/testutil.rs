//! Hand-assembled ELF images for tests

use object::elf::{ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFMAG, EM_RISCV, ET_EXEC, EV_CURRENT};
use object::elf::{SHT_NOBITS, SHT_PROGBITS, SHT_STRTAB};

struct SectionSpec {
    name: String,
    kind: u32,
    address: u64,
    data: Vec<u8>,
    /// Size recorded in the header when it differs from `data.len()`
    size: Option<u64>,
}

/// Builds a little-endian executable with a NULL section first and the
/// `.shstrtab` name table last.
pub struct ElfBuilder {
    wide: bool,
    entry: u64,
    sections: Vec<SectionSpec>,
}

impl ElfBuilder {
    pub fn elf32(entry: u64) -> Self {
        Self {
            wide: false,
            entry,
            sections: Vec::new(),
        }
    }

    pub fn elf64(entry: u64) -> Self {
        Self {
            wide: true,
            entry,
            sections: Vec::new(),
        }
    }

    pub fn section(mut self, name: &str, kind: u32, address: u64, data: &[u8]) -> Self {
        self.sections.push(SectionSpec {
            name: name.to_string(),
            kind,
            address,
            data: data.to_vec(),
            size: None,
        });
        self
    }

    pub fn progbits(self, name: &str, address: u64, data: &[u8]) -> Self {
        self.section(name, SHT_PROGBITS, address, data)
    }

    pub fn nobits(mut self, name: &str, address: u64, size: u64) -> Self {
        self.sections.push(SectionSpec {
            name: name.to_string(),
            kind: SHT_NOBITS,
            address,
            data: Vec::new(),
            size: Some(size),
        });
        self
    }

    fn header_size(&self) -> usize {
        if self.wide { 64 } else { 52 }
    }

    fn entry_size(&self) -> usize {
        if self.wide { 64 } else { 40 }
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = vec![0u8; self.header_size()];

        let mut strtab = vec![0u8];
        let mut name_of = |name: &str| {
            let index = strtab.len() as u64;
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
            index
        };

        // (name, type, address, offset, size)
        let mut headers = vec![(0u64, 0u32, 0u64, 0u64, 0u64)];
        for spec in &self.sections {
            align(&mut out, 4);
            let offset = out.len() as u64;
            out.extend_from_slice(&spec.data);
            let size = spec.size.unwrap_or(spec.data.len() as u64);
            headers.push((name_of(&spec.name), spec.kind, spec.address, offset, size));
        }
        let shstrtab_name = name_of(".shstrtab");
        let offset = out.len() as u64;
        out.extend_from_slice(&strtab);
        headers.push((shstrtab_name, SHT_STRTAB, 0, offset, strtab.len() as u64));

        align(&mut out, 8);
        let shoff = out.len() as u64;
        for &(name, kind, address, offset, size) in &headers {
            let start = out.len();
            out.resize(start + self.entry_size(), 0);
            let entry = &mut out[start..];
            put(entry, 0, 4, name);
            put(entry, 4, 4, kind as u64);
            if self.wide {
                put(entry, 16, 8, address);
                put(entry, 24, 8, offset);
                put(entry, 32, 8, size);
                put(entry, 48, 8, 1);
            } else {
                put(entry, 12, 4, address);
                put(entry, 16, 4, offset);
                put(entry, 20, 4, size);
                put(entry, 32, 4, 1);
            }
        }

        let count = headers.len() as u64;
        out[..4].copy_from_slice(&ELFMAG);
        out[4] = if self.wide { ELFCLASS64 } else { ELFCLASS32 };
        out[5] = ELFDATA2LSB;
        out[6] = EV_CURRENT;
        put(&mut out, 16, 2, ET_EXEC as u64);
        put(&mut out, 18, 2, EM_RISCV as u64);
        put(&mut out, 20, 4, EV_CURRENT as u64);
        if self.wide {
            put(&mut out, 24, 8, self.entry);
            put(&mut out, 40, 8, shoff);
            put(&mut out, 52, 2, 64);
            put(&mut out, 54, 2, 56);
            put(&mut out, 58, 2, 64);
            put(&mut out, 60, 2, count);
            put(&mut out, 62, 2, count - 1);
        } else {
            put(&mut out, 24, 4, self.entry);
            put(&mut out, 32, 4, shoff);
            put(&mut out, 40, 2, 52);
            put(&mut out, 42, 2, 32);
            put(&mut out, 46, 2, 40);
            put(&mut out, 48, 2, count);
            put(&mut out, 50, 2, count - 1);
        }
        out
    }
}

fn align(out: &mut Vec<u8>, to: usize) {
    let len = out.len().next_multiple_of(to);
    out.resize(len, 0);
}

fn put(buf: &mut [u8], offset: usize, width: usize, value: u64) {
    buf[offset..offset + width].copy_from_slice(&value.to_le_bytes()[..width]);
}
