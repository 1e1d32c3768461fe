use std::collections::HashSet;
use std::path::Path;

use goblin::elf::Elf;
use goblin::elf::header::ET_DYN;
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::section_header::SHN_UNDEF;
use goblin::elf::sym::STT_FUNC;

use retrace_tracer::backend::{Symbol, SymbolKind, SymbolTable};

const PLT_ENTRY_SIZE: u64 = 16;
const PAGE_MASK: u64 = !0xfff;

/// Builds the table of traceable symbols of the executable at `path`,
/// relocated to where it is mapped in the given process.
pub fn symbol_table(pid: u64, path: &Path) -> crate::sys::Result<SymbolTable> {
    let bytes =
        std::fs::read(path).map_err(|e| crate::sys::Error::File(path.to_path_buf(), e))?;

    let elf = Elf::parse(&bytes)?;

    let bias = if elf.header.e_type == ET_DYN {
        let maps_path = format!("/proc/{pid}/maps");
        let maps = std::fs::read_to_string(&maps_path)
            .map_err(|e| crate::sys::Error::File(maps_path.into(), e))?;

        let base = parse_load_base(&maps, path)
            .ok_or_else(|| crate::sys::Error::MissingMapping(path.to_path_buf(), pid))?;

        base.wrapping_sub(min_load_vaddr(&elf) & PAGE_MASK)
    } else {
        0
    };

    tracing::debug!(
        path = %path.display(),
        bias = format_args!("{bias:#x}"),
        "loading symbols"
    );

    let table: SymbolTable = plt_symbols(&elf)
        .chain(local_symbols(&elf))
        .map(|mut symbol| {
            symbol.entry_addr = symbol.entry_addr.wrapping_add(bias);
            symbol
        })
        .collect();

    tracing::debug!(count = table.len(), "loaded symbols");

    Ok(table)
}

/// Returns the start address of the mapping of `path`'s first page, from the
/// content of a `/proc/<pid>/maps` file.
pub fn parse_load_base(maps: &str, path: &Path) -> Option<u64> {
    maps.lines().find_map(|line| {
        let mut fields = line.split_whitespace();

        let range = fields.next()?;
        let _perms = fields.next()?;
        let offset = fields.next()?;

        let pathname = line.find('/').map(|i| line[i..].trim_end())?;

        if Path::new(pathname) != path || u64::from_str_radix(offset, 16).ok()? != 0 {
            return None;
        }

        let (start, _) = range.split_once('-')?;
        u64::from_str_radix(start, 16).ok()
    })
}

fn min_load_vaddr(elf: &Elf) -> u64 {
    elf.program_headers
        .iter()
        .filter(|phdr| phdr.p_type == PT_LOAD)
        .map(|phdr| phdr.p_vaddr)
        .min()
        .unwrap_or(0)
}

/// Stubs of the procedure linkage table, named after their relocation.
fn plt_symbols<'a>(elf: &'a Elf) -> impl Iterator<Item = Symbol> + 'a {
    let section_addr = |name: &str| {
        elf.section_headers
            .iter()
            .find(|sh| elf.shdr_strtab.get_at(sh.sh_name) == Some(name))
            .map(|sh| sh.sh_addr)
    };

    // with IBT, calls go through `.plt.sec`, which has no header entry
    let first_stub = section_addr(".plt.sec")
        .or_else(|| section_addr(".plt").map(|addr| addr + PLT_ENTRY_SIZE));

    first_stub.into_iter().flat_map(move |first_stub| {
        elf.pltrelocs
            .iter()
            .enumerate()
            .filter_map(move |(index, reloc)| {
                let sym = elf.dynsyms.get(reloc.r_sym)?;
                let name = elf.dynstrtab.get_at(sym.st_name)?;

                (!name.is_empty()).then(|| {
                    Symbol::new(
                        name,
                        first_stub + PLT_ENTRY_SIZE * index as u64,
                        SymbolKind::Plt,
                    )
                })
            })
    })
}

/// Functions defined in the executable itself.
fn local_symbols<'a>(elf: &'a Elf) -> impl Iterator<Item = Symbol> + 'a {
    let mut seen = HashSet::new();

    let syms = elf.syms.iter().map(move |sym| (sym, &elf.strtab));
    let dynsyms = elf.dynsyms.iter().map(move |sym| (sym, &elf.dynstrtab));

    syms.chain(dynsyms).filter_map(move |(sym, strtab)| {
        if sym.st_type() != STT_FUNC || sym.st_value == 0 || sym.st_shndx == SHN_UNDEF as usize {
            return None;
        }

        let name = strtab.get_at(sym.st_name).filter(|name| !name.is_empty())?;

        seen.insert((name, sym.st_value))
            .then(|| Symbol::new(name, sym.st_value, SymbolKind::Local))
    })
}
