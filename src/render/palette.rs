use std::collections::HashMap;

/// Color given to metro lines missing from the configured table
pub const DEFAULT_METRO_COLOR: &str = "#FEC8D8";

/// Metro line name to color string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorTable {
    colors: HashMap<String, String>,
}

impl ColorTable {
    pub fn new(colors: HashMap<String, String>) -> Self {
        Self { colors }
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.colors.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.colors.contains_key(name)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Line names with their colors, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.colors.iter().map(|(name, color)| (name.as_str(), color.as_str()))
    }
}

/// Color for a metro line, and the table to use for the next lookup.
///
/// Unknown names get `DEFAULT_METRO_COLOR`, recorded in the returned table so
/// later lookups for the same name agree.
pub fn resolve_color(name: &str, mut table: ColorTable) -> (String, ColorTable) {
    let color = table
        .colors
        .entry(name.to_string())
        .or_insert_with(|| DEFAULT_METRO_COLOR.to_string())
        .clone();
    (color, table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_line_keeps_color() {
        let table = ColorTable::new(HashMap::from([("M1".to_string(), "#ff0000".to_string())]));
        let (color, table) = resolve_color("M1", table);
        assert_eq!(color, "#ff0000");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unknown_line_recorded_once() {
        let (color, table) = resolve_color("Ghost Line", ColorTable::default());
        assert_eq!(color, DEFAULT_METRO_COLOR);
        assert_eq!(table.get("Ghost Line"), Some(DEFAULT_METRO_COLOR));

        let (again, table) = resolve_color("Ghost Line", table);
        assert_eq!(again, DEFAULT_METRO_COLOR);
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().collect::<Vec<_>>(), vec![("Ghost Line", DEFAULT_METRO_COLOR)]);
    }
}
