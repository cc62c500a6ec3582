use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub address: u32,
    pub function: bool,
    pub global: bool,
}

impl Symbol {
    /// Among symbols sharing an address, functions and globals are
    /// preferred when naming it.
    fn precedence(a: &Self, b: &Self) -> Ordering {
        a.address
            .cmp(&b.address)
            .then(b.function.cmp(&a.function))
            .then(b.global.cmp(&a.global))
            .then_with(|| a.name.starts_with('.').cmp(&b.name.starts_with('.')))
            .then_with(|| a.name.cmp(&b.name))
    }
}

/// Symbols sorted by address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new(mut symbols: Vec<Symbol>) -> Self {
        symbols.sort_by(Symbol::precedence);
        Self { symbols }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Closest symbol at or below `address`, with the offset into it.
    pub fn lookup(&self, address: u32) -> Option<(&str, u32)> {
        let count = self.symbols.partition_point(|symbol| symbol.address <= address);
        let mut index = count.checked_sub(1)?;
        // Step back to the preferred name for that address
        while index > 0 && self.symbols[index - 1].address == self.symbols[index].address {
            index -= 1;
        }
        let symbol = &self.symbols[index];
        Some((&symbol.name, address - symbol.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, address: u32, function: bool) -> Symbol {
        Symbol {
            name: name.into(),
            address,
            function,
            global: true,
        }
    }

    #[test]
    fn test_lookup() {
        let table = SymbolTable::new(vec![
            symbol("main", 0x400200, true),
            symbol("data_start", 0x10000000, false),
            symbol("__start", 0x400100, true),
            symbol("main_alias", 0x400200, false),
        ]);

        assert_eq!(table.len(), 4);
        assert_eq!(table.lookup(0x400100), Some(("__start", 0)));
        assert_eq!(table.lookup(0x400234), Some(("main", 0x34)));
        assert_eq!(table.lookup(0x10000010), Some(("data_start", 0x10)));
        assert_eq!(table.lookup(0x400000), None);
        assert_eq!(SymbolTable::default().lookup(0x400100), None);
    }
}
