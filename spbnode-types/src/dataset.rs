use thiserror::Error;

use crate::payload::{self, data_set, DataType};
use crate::value::{data_set_value_to_scalar, scalar_to_data_set_value, Value};

#[derive(Debug, Error, PartialEq, Clone)]
pub enum SchemaError {
    #[error("DataSet has {names} column names but {types} column types")]
    ColumnCountMismatch { names: usize, types: usize },
    #[error("DataSet declares {declared} columns but has {actual}")]
    DeclaredColumnCount { declared: u64, actual: usize },
    #[error("Column datatype {0:?} is not supported in a DataSet")]
    UnsupportedColumnType(DataType),
    #[error("Unknown column datatype {0}")]
    UnknownColumnType(u32),
    #[error("Row {row} has {actual} cells, expected {expected}")]
    RowArity {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Cell ({row}, {column}) does not match column datatype {expected:?}")]
    CellType {
        row: usize,
        column: usize,
        expected: DataType,
    },
    #[error("Cell ({row}, {column}) holds an unsupported value")]
    UnsupportedCellValue { row: usize, column: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
}

/// A single DataSet row. `None` cells are null.
pub type Row = Vec<Option<Value>>;

/// A table of typed columns and rows.
///
/// The column schema is fixed on construction and every row is checked
/// against it, so a `DataSet` value is always well formed.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl DataSet {
    pub fn new<S: Into<String>>(
        columns: impl IntoIterator<Item = (S, DataType)>,
    ) -> Result<Self, SchemaError> {
        let columns = columns
            .into_iter()
            .map(|(name, datatype)| {
                if !datatype.is_scalar() {
                    return Err(SchemaError::UnsupportedColumnType(datatype));
                }
                Ok(Column {
                    name: name.into(),
                    datatype,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Append a row. Every non-null cell must carry exactly its column's datatype.
    pub fn push_row(&mut self, row: Row) -> Result<(), SchemaError> {
        let index = self.rows.len();
        if row.len() != self.columns.len() {
            return Err(SchemaError::RowArity {
                row: index,
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        for (column, (cell, def)) in row.iter().zip(self.columns.iter()).enumerate() {
            if let Some(value) = cell {
                if value.datatype() != def.datatype {
                    return Err(SchemaError::CellType {
                        row: index,
                        column,
                        expected: def.datatype,
                    });
                }
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn with_row(mut self, row: Row) -> Result<Self, SchemaError> {
        self.push_row(row)?;
        Ok(self)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl From<DataSet> for payload::DataSet {
    fn from(value: DataSet) -> Self {
        let num_of_columns = value.columns.len() as u64;
        let (columns, types): (Vec<String>, Vec<u32>) = value
            .columns
            .into_iter()
            .map(|c| (c.name, c.datatype as u32))
            .unzip();
        let rows = value
            .rows
            .into_iter()
            .map(|row| data_set::Row {
                elements: row
                    .into_iter()
                    .map(|cell| data_set::DataSetValue {
                        // cells were checked against scalar columns on insertion
                        value: cell.and_then(|v| scalar_to_data_set_value(v).ok()),
                    })
                    .collect(),
            })
            .collect();
        payload::DataSet {
            num_of_columns: Some(num_of_columns),
            columns,
            types,
            rows,
        }
    }
}

impl TryFrom<payload::DataSet> for DataSet {
    type Error = SchemaError;

    fn try_from(value: payload::DataSet) -> Result<Self, Self::Error> {
        if value.columns.len() != value.types.len() {
            return Err(SchemaError::ColumnCountMismatch {
                names: value.columns.len(),
                types: value.types.len(),
            });
        }
        if let Some(declared) = value.num_of_columns {
            if declared != value.columns.len() as u64 {
                return Err(SchemaError::DeclaredColumnCount {
                    declared,
                    actual: value.columns.len(),
                });
            }
        }

        let mut types = Vec::with_capacity(value.types.len());
        for t in value.types {
            let datatype = DataType::try_from(t).map_err(|_| SchemaError::UnknownColumnType(t))?;
            types.push(datatype);
        }

        let mut dataset = DataSet::new(value.columns.into_iter().zip(types.iter().copied()))?;

        for (row_index, row) in value.rows.into_iter().enumerate() {
            if row.elements.len() != types.len() {
                return Err(SchemaError::RowArity {
                    row: row_index,
                    expected: types.len(),
                    actual: row.elements.len(),
                });
            }
            let mut cells = Vec::with_capacity(types.len());
            for (column, (cell, datatype)) in row.elements.into_iter().zip(types.iter()).enumerate()
            {
                let cell = match cell.value {
                    None => None,
                    Some(data_set::data_set_value::Value::ExtensionValue(_)) => {
                        return Err(SchemaError::UnsupportedCellValue {
                            row: row_index,
                            column,
                        })
                    }
                    Some(v) => Some(data_set_value_to_scalar(*datatype, v).map_err(|_| {
                        SchemaError::CellType {
                            row: row_index,
                            column,
                            expected: *datatype,
                        }
                    })?),
                };
                cells.push(cell);
            }
            dataset.rows.push(cells);
        }
        Ok(dataset)
    }
}
