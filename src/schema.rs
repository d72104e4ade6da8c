//! Fixed table binding for the matter store.
//!
//! One store holds exactly one object type. The schema names the backing
//! table, the object-type tag stamped into every response record, and the
//! ordered column list that both the CSV source and the table follow.

/// Object-type tag and table name for legal matters.
pub const MATTER_OBJECT_TYPE: &str = "litify_pm__Matter__c";

/// Column names in source order. The first column is the primary key.
pub const MATTER_COLUMNS: [&str; 15] = [
    "Id",
    "litify_pm__Display_Name__c",
    "litify_pm__Client__r",
    "litify_pm__Client__r_bis_Full_Formatted_Name__c",
    "RecordType",
    "RecordType_Name",
    "bis_Case_Type__c",
    "litify_pm__Status__c",
    "Case_Stage__c",
    "Case_Sub_Stage__c",
    "litify_pm__Open_Date__c",
    "litify_pm__Closed_Date__c",
    "Primary_Legal_Assistant__r",
    "bis_Attorney_Name__c",
    "Primary_Legal_Assistant__r_Name",
];

/// Static description of a single-object-type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub object_type: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

impl TableSchema {
    /// Schema for `litify_pm__Matter__c` rows.
    pub const fn matters() -> Self {
        Self {
            object_type: MATTER_OBJECT_TYPE,
            table: MATTER_OBJECT_TYPE,
            columns: &MATTER_COLUMNS,
        }
    }

    pub fn primary_key(&self) -> &'static str {
        self.columns[0]
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn create_table_sql(&self) -> String {
        let mut defs = Vec::with_capacity(self.columns.len());
        for (idx, column) in self.columns.iter().enumerate() {
            if idx == 0 {
                defs.push(format!("{column} TEXT PRIMARY KEY"));
            } else {
                defs.push(format!("{column} TEXT NOT NULL DEFAULT ''"));
            }
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table,
            defs.join(", ")
        )
    }

    pub fn upsert_sql(&self) -> String {
        let placeholders = (1..=self.columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            self.table,
            self.columns.join(", "),
            placeholders
        )
    }

    pub fn select_all_sql(&self) -> String {
        format!("SELECT {} FROM {}", self.columns.join(", "), self.table)
    }

    pub fn select_by_key_sql(&self) -> String {
        format!(
            "{} WHERE {} = ?1 LIMIT 1",
            self.select_all_sql(),
            self.primary_key()
        )
    }
}
