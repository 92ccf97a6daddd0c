//! The JSON encoding of gridded datasets served through the gateway.
//!
//! ```json
//! {
//!     "coords": [{"name": "time", "values": ["2020-01-01", "2020-01-02"]}, ...],
//!     "data_vars": [{"name": "precip", "dims": ["time", ...], "values": [0.5, null, ...]}]
//! }
//! ```
//!
//! Variable values are flattened in row-major order. `null` marks a missing value.
//!
use ndarray::{ArrayD, IxDyn};
use serde::Deserialize;
use serde_json::Value;

use dclimate::{parse_date, Coordinate, Dataset, Error, Result, Variable};

#[derive(Debug, Deserialize)]
pub struct DatasetDocument {
    pub coords: Vec<CoordDocument>,

    #[serde(default)]
    pub data_vars: Vec<VariableDocument>,
}

#[derive(Debug, Deserialize)]
pub struct CoordDocument {
    pub name: String,
    pub values: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct VariableDocument {
    pub name: String,
    pub dims: Vec<String>,
    pub values: Vec<Option<f64>>,
}

impl DatasetDocument {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn into_dataset(self) -> Result<Dataset> {
        let coords = self
            .coords
            .into_iter()
            .map(CoordDocument::into_coordinate)
            .collect::<Result<Vec<_>>>()?;

        let mut variables = Vec::with_capacity(self.data_vars.len());
        for var in self.data_vars {
            let shape = var
                .dims
                .iter()
                .map(|dim| {
                    coords
                        .iter()
                        .find(|coord| &coord.name == dim)
                        .map(Coordinate::len)
                        .ok_or_else(|| {
                            Error::InvalidDataset(format!(
                                "variable '{}' uses dimension '{dim}' which has no coordinate",
                                var.name
                            ))
                        })
                })
                .collect::<Result<Vec<usize>>>()?;

            let expected: usize = shape.iter().product();
            if var.values.len() != expected {
                return Err(Error::InvalidDataset(format!(
                    "variable '{}' has {} values, expected {expected} for shape {shape:?}",
                    var.name,
                    var.values.len()
                )));
            }

            let values = var
                .values
                .into_iter()
                .map(|value| value.unwrap_or(f64::NAN))
                .collect();
            let data = ArrayD::from_shape_vec(IxDyn(&shape), values)?;
            let dims: Vec<&str> = var.dims.iter().map(String::as_str).collect();
            variables.push(Variable::new(var.name.as_str(), &dims, data)?);
        }

        Dataset::new(coords, variables)
    }
}

impl CoordDocument {
    /// Numbers make a float coordinate, strings that are all dates a time coordinate, any other
    /// strings a text coordinate.
    ///
    fn into_coordinate(self) -> Result<Coordinate> {
        let name = self.name;
        if self.values.iter().all(Value::is_number) {
            let values = self.values.iter().filter_map(Value::as_f64).collect();
            return Ok(Coordinate::float(name, values));
        }

        let text = self
            .values
            .into_iter()
            .map(|value| match value {
                Value::String(text) => Ok(text),
                other => Err(Error::InvalidDataset(format!(
                    "coordinate '{name}' mixes strings with {other}"
                ))),
            })
            .collect::<Result<Vec<String>>>()?;

        let dates: Option<Vec<_>> = text.iter().map(|value| parse_date(value)).collect();
        match dates {
            Some(dates) => Ok(Coordinate::time(name, dates)),
            None => Ok(Coordinate::text(name, text)),
        }
    }
}
