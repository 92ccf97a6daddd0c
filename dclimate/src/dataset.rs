use std::ops::Range;

use chrono::{DateTime, Utc};
use ndarray::{concatenate, stack, Array1, Array2, ArrayD, ArrayViewD, Axis, Slice};

use crate::{
    errors::{Error, Result},
    geom::{match_index, MatchMethod},
    time,
};

/// An opened gridded dataset: dimension coordinates plus data variables.
///
/// Every dimension has exactly one coordinate of the same name. Data variables are stored as
/// `f64` with NaN standing in for missing values. Dimensions collapsed by scalar selection are
/// kept as scalar coordinates.
///
/// All selection methods return a new `Dataset`; a `Dataset` is never mutated in place.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    coords: Vec<Coordinate>,
    scalars: Vec<(String, CoordinateValue)>,
    variables: Vec<Variable>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Coordinate {
    /// Name of the coordinate, which is also the name of its dimension, e.g. "latitude"
    pub name: String,

    pub values: CoordinateValues,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CoordinateValues {
    Float(Array1<f64>),
    Int(Array1<i64>),
    Time(Array1<DateTime<Utc>>),
    Text(Array1<String>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum CoordinateValue {
    Float(f64),
    Int(i64),
    Time(DateTime<Utc>),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    /// Name of the variable, e.g. "precipitation"
    pub name: String,

    /// Dimension names, one per axis of `data`
    pub dims: Vec<String>,

    pub data: ArrayD<f64>,
}

/// Positional selection along one dimension.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Indexer {
    /// A single position. The dimension is dropped and its coordinate becomes a scalar.
    Index(usize),

    /// An arbitrary list of positions, in the given order.
    Indices(Vec<usize>),

    /// A contiguous run of positions.
    Range(Range<usize>),
}

macro_rules! map_values {
    ($values:expr, $array:ident => $body:expr) => {
        match $values {
            CoordinateValues::Float($array) => CoordinateValues::Float($body),
            CoordinateValues::Int($array) => CoordinateValues::Int($body),
            CoordinateValues::Time($array) => CoordinateValues::Time($body),
            CoordinateValues::Text($array) => CoordinateValues::Text($body),
        }
    };
}

impl CoordinateValue {
    /// A numeric form suitable for ordering values of the same kind. Temporal values become epoch
    /// milliseconds, text is parsed as a number or, failing that, a date.
    ///
    pub fn comparable(&self) -> Option<f64> {
        match self {
            CoordinateValue::Float(value) if value.is_nan() => None,
            CoordinateValue::Float(value) => Some(*value),
            CoordinateValue::Int(value) => Some(*value as f64),
            CoordinateValue::Time(value) => Some(time::to_epoch_millis(value)),
            CoordinateValue::Text(value) => value
                .trim()
                .parse::<f64>()
                .ok()
                .or_else(|| time::parse_date(value).map(|date| time::to_epoch_millis(&date))),
        }
    }
}

impl Coordinate {
    pub fn float<S: Into<String>>(name: S, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: CoordinateValues::Float(Array1::from(values)),
        }
    }

    pub fn int<S: Into<String>>(name: S, values: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            values: CoordinateValues::Int(Array1::from(values)),
        }
    }

    pub fn time<S: Into<String>>(name: S, values: Vec<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            values: CoordinateValues::Time(Array1::from(values)),
        }
    }

    pub fn text<S: Into<String>>(name: S, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values: CoordinateValues::Text(Array1::from(values)),
        }
    }

    pub fn len(&self) -> usize {
        match &self.values {
            CoordinateValues::Float(values) => values.len(),
            CoordinateValues::Int(values) => values.len(),
            CoordinateValues::Time(values) => values.len(),
            CoordinateValues::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<CoordinateValue> {
        match &self.values {
            CoordinateValues::Float(values) => {
                values.get(index).copied().map(CoordinateValue::Float)
            }
            CoordinateValues::Int(values) => values.get(index).copied().map(CoordinateValue::Int),
            CoordinateValues::Time(values) => values.get(index).copied().map(CoordinateValue::Time),
            CoordinateValues::Text(values) => {
                values.get(index).map(|v| CoordinateValue::Text(v.clone()))
            }
        }
    }

    pub fn first(&self) -> Option<CoordinateValue> {
        self.get(0)
    }

    pub fn last(&self) -> Option<CoordinateValue> {
        self.len().checked_sub(1).and_then(|index| self.get(index))
    }

    /// See `CoordinateValue::comparable`.
    pub fn comparable(&self, index: usize) -> Option<f64> {
        self.get(index).and_then(|value| value.comparable())
    }

    pub fn comparable_values(&self) -> Vec<Option<f64>> {
        (0..self.len()).map(|index| self.comparable(index)).collect()
    }

    /// The values of a numeric coordinate as `f64`.
    ///
    /// Fails with `InvalidSelection` for temporal or text coordinates.
    ///
    pub fn numeric_values(&self) -> Result<Vec<f64>> {
        match &self.values {
            CoordinateValues::Float(values) => Ok(values.to_vec()),
            CoordinateValues::Int(values) => Ok(values.iter().map(|v| *v as f64).collect()),
            _ => Err(Error::InvalidSelection(format!(
                "coordinate '{}' is not numeric",
                self.name
            ))),
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            values: map_values!(&self.values, values => values.select(Axis(0), indices)),
        }
    }

    fn slice(&self, range: Range<usize>) -> Self {
        Self {
            name: self.name.clone(),
            values: map_values!(
                &self.values,
                values => values.slice_axis(Axis(0), Slice::from(range.clone())).to_owned()
            ),
        }
    }

    fn concat(&self, other: &Coordinate) -> Result<Self> {
        let values = match (&self.values, &other.values) {
            (CoordinateValues::Float(a), CoordinateValues::Float(b)) => {
                CoordinateValues::Float(concatenate(Axis(0), &[a.view(), b.view()])?)
            }
            (CoordinateValues::Int(a), CoordinateValues::Int(b)) => {
                CoordinateValues::Int(concatenate(Axis(0), &[a.view(), b.view()])?)
            }
            (CoordinateValues::Time(a), CoordinateValues::Time(b)) => {
                CoordinateValues::Time(concatenate(Axis(0), &[a.view(), b.view()])?)
            }
            (CoordinateValues::Text(a), CoordinateValues::Text(b)) => {
                CoordinateValues::Text(concatenate(Axis(0), &[a.view(), b.view()])?)
            }
            _ => {
                return Err(Error::InvalidDataset(format!(
                    "cannot concatenate coordinate '{}' of different kinds",
                    self.name
                )))
            }
        };

        Ok(Self {
            name: self.name.clone(),
            values,
        })
    }
}

impl Variable {
    pub fn new<S: Into<String>>(name: S, dims: &[&str], data: ArrayD<f64>) -> Result<Self> {
        let name = name.into();
        if dims.len() != data.ndim() {
            return Err(Error::InvalidDataset(format!(
                "variable '{name}' has {} dimension names for {} axes",
                dims.len(),
                data.ndim()
            )));
        }

        Ok(Self {
            name,
            dims: dims.iter().map(|dim| dim.to_string()).collect(),
            data,
        })
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// Number of values that are not missing
    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|value| !value.is_nan()).count()
    }

    /// Axis permutation that moves `front` to the front, in order, keeping the other axes in
    /// their original order. `None` unless every dimension in `front` is present.
    ///
    fn front_order(&self, front: &[&str]) -> Option<Vec<usize>> {
        let mut order = Vec::with_capacity(self.dims.len());
        for dim in front {
            order.push(self.axis_of(dim)?);
        }
        for axis in 0..self.dims.len() {
            if !order.contains(&axis) {
                order.push(axis);
            }
        }

        Some(order)
    }

    fn isel(&self, dim: &str, indexer: &Indexer) -> Self {
        let axis = match self.axis_of(dim) {
            Some(axis) => axis,
            None => return self.clone(),
        };

        let mut dims = self.dims.clone();
        let data = match indexer {
            Indexer::Index(index) => {
                dims.remove(axis);
                self.data.index_axis(Axis(axis), *index).to_owned()
            }
            Indexer::Indices(indices) => self.data.select(Axis(axis), indices),
            Indexer::Range(range) => self
                .data
                .slice_axis(Axis(axis), Slice::from(range.clone()))
                .to_owned(),
        };

        Self {
            name: self.name.clone(),
            dims,
            data,
        }
    }

    /// Whether the cell at `(row, col)` of the `row_dim` x `col_dim` plane holds any valid value
    /// across the remaining dimensions.
    ///
    pub(crate) fn plane_has_data(&self, row_dim: &str, col_dim: &str) -> Option<Array2<bool>> {
        let order = self.front_order(&[row_dim, col_dim])?;
        let view = self.data.view().permuted_axes(order);
        let (rows, cols) = (view.shape()[0], view.shape()[1]);

        Some(Array2::from_shape_fn((rows, cols), |(row, col)| {
            let plane = view.index_axis(Axis(0), row);
            let cell = plane.index_axis(Axis(0), col);
            cell.iter().any(|value| !value.is_nan())
        }))
    }
}

impl Indexer {
    fn check(&self, dim: &str, len: usize) -> Result<()> {
        let out_of_range = match self {
            Indexer::Index(index) => *index >= len,
            Indexer::Indices(indices) => indices.iter().any(|index| *index >= len),
            Indexer::Range(range) => range.start > range.end || range.end > len,
        };
        if out_of_range {
            Err(Error::InvalidSelection(format!(
                "index {self:?} is out of bounds for dimension '{dim}' of length {len}"
            )))
        } else {
            Ok(())
        }
    }
}

impl Dataset {
    /// Assemble a dataset, checking that every variable's dimensions have coordinates of matching
    /// length.
    ///
    pub fn new(coords: Vec<Coordinate>, variables: Vec<Variable>) -> Result<Self> {
        for (i, coord) in coords.iter().enumerate() {
            if coords[..i].iter().any(|other| other.name == coord.name) {
                return Err(Error::InvalidDataset(format!(
                    "duplicate coordinate '{}'",
                    coord.name
                )));
            }
        }

        for variable in &variables {
            for (axis, dim) in variable.dims.iter().enumerate() {
                let coord = coords.iter().find(|coord| &coord.name == dim).ok_or_else(|| {
                    Error::InvalidDataset(format!(
                        "variable '{}' uses dimension '{dim}' which has no coordinate",
                        variable.name
                    ))
                })?;
                if coord.len() != variable.data.shape()[axis] {
                    return Err(Error::InvalidDataset(format!(
                        "variable '{}' has {} values along '{dim}' but the coordinate has {}",
                        variable.name,
                        variable.data.shape()[axis],
                        coord.len()
                    )));
                }
            }
        }

        Ok(Self {
            coords,
            scalars: vec![],
            variables,
        })
    }

    pub fn coords(&self) -> &[Coordinate] {
        &self.coords
    }

    pub fn coord(&self, name: &str) -> Option<&Coordinate> {
        self.coords.iter().find(|coord| coord.name == name)
    }

    pub fn has_dim(&self, name: &str) -> bool {
        self.coord(name).is_some()
    }

    /// Coordinates of dimensions that were collapsed by scalar selection.
    pub fn scalars(&self) -> &[(String, CoordinateValue)] {
        &self.scalars
    }

    pub fn scalar(&self, name: &str) -> Option<&CoordinateValue> {
        self.scalars
            .iter()
            .find(|(scalar, _)| scalar == name)
            .map(|(_, value)| value)
    }

    pub fn dims(&self) -> Vec<&str> {
        self.coords.iter().map(|coord| coord.name.as_str()).collect()
    }

    pub fn sizes(&self) -> Vec<(&str, usize)> {
        self.coords
            .iter()
            .map(|coord| (coord.name.as_str(), coord.len()))
            .collect()
    }

    pub fn size(&self, dim: &str) -> Option<usize> {
        self.coord(dim).map(|coord| coord.len())
    }

    /// A dataset is empty when any of its dimensions has size zero.
    pub fn is_empty(&self) -> bool {
        self.coords.iter().any(|coord| coord.is_empty())
    }

    pub fn data_vars(&self) -> &[Variable] {
        &self.variables
    }

    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|var| var.name == name)
    }

    fn require_coord(&self, dim: &str) -> Result<&Coordinate> {
        self.coord(dim).ok_or_else(|| {
            Error::InvalidSelection(format!(
                "dataset has no dimension '{dim}'. Available dimensions: {}",
                self.dims().join(", ")
            ))
        })
    }

    /// Select by position along `dim`.
    ///
    pub fn isel(&self, dim: &str, indexer: Indexer) -> Result<Self> {
        let coord = self.require_coord(dim)?;
        indexer.check(dim, coord.len())?;

        let mut coords = self.coords.clone();
        let mut scalars = self.scalars.clone();
        let position = coords
            .iter()
            .position(|coord| coord.name == dim)
            .unwrap_or_default();
        match &indexer {
            Indexer::Index(index) => {
                let removed = coords.remove(position);
                if let Some(value) = removed.get(*index) {
                    scalars.push((removed.name, value));
                }
            }
            Indexer::Indices(indices) => coords[position] = coord.take(indices),
            Indexer::Range(range) => coords[position] = coord.slice(range.clone()),
        }

        let variables = self
            .variables
            .iter()
            .map(|var| var.isel(dim, &indexer))
            .collect();

        Ok(Self {
            coords,
            scalars,
            variables,
        })
    }

    /// Select by coordinate value along `dim`, collapsing the dimension.
    ///
    /// `target` is compared against the coordinate's comparable form (see
    /// `CoordinateValue::comparable`). Fails with `NoDataFound` if nothing matches.
    ///
    pub fn sel(&self, dim: &str, target: f64, method: MatchMethod) -> Result<Self> {
        let index = self.match_position(dim, target, method)?;
        self.isel(dim, Indexer::Index(index))
    }

    /// Vectorized selection: the `i`-th point is made of the `i`-th target of every entry in
    /// `selections`. The selected dimensions are replaced by a single `new_dim` dimension.
    ///
    pub fn sel_points(
        &self,
        selections: &[(&str, &[f64])],
        method: MatchMethod,
        new_dim: &str,
    ) -> Result<Self> {
        let mut positions = Vec::with_capacity(selections.len());
        for (dim, targets) in selections {
            let indices = targets
                .iter()
                .map(|target| self.match_position(dim, *target, method))
                .collect::<Result<Vec<_>>>()?;
            positions.push((*dim, indices));
        }

        self.isel_points(&positions, new_dim)
    }

    /// Pointwise positional selection. See `sel_points`.
    ///
    pub fn isel_points(&self, selections: &[(&str, Vec<usize>)], new_dim: &str) -> Result<Self> {
        let n = match selections.first() {
            Some((_, indices)) => indices.len(),
            None => return Ok(self.clone()),
        };
        if n == 0 || selections.iter().any(|(_, indices)| indices.len() != n) {
            return Err(Error::InvalidSelection(String::from(
                "pointwise selection needs the same non-zero number of indices in every dimension",
            )));
        }
        for (dim, indices) in selections {
            let coord = self.require_coord(dim)?;
            Indexer::Indices(indices.clone()).check(dim, coord.len())?;
        }

        let selected: Vec<&str> = selections.iter().map(|(dim, _)| *dim).collect();
        let first = self
            .coords
            .iter()
            .position(|coord| selected.contains(&coord.name.as_str()))
            .unwrap_or_default();
        let mut coords: Vec<Coordinate> = self
            .coords
            .iter()
            .filter(|coord| !selected.contains(&coord.name.as_str()))
            .cloned()
            .collect();
        coords.insert(
            first.min(coords.len()),
            Coordinate::int(new_dim, (0..n as i64).collect()),
        );

        let mut variables = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            let present: Vec<(&str, &Vec<usize>)> = selections
                .iter()
                .filter(|(dim, _)| var.axis_of(dim).is_some())
                .map(|(dim, indices)| (*dim, indices))
                .collect();
            if present.is_empty() {
                variables.push(var.clone());
                continue;
            }

            let front: Vec<&str> = present.iter().map(|(dim, _)| *dim).collect();
            let order = var.front_order(&front).unwrap_or_default();
            let view = var.data.view().permuted_axes(order.clone());
            let points: Vec<ArrayViewD<f64>> = (0..n)
                .map(|point| {
                    present.iter().fold(view.clone(), |sub, (_, indices)| {
                        sub.index_axis_move(Axis(0), indices[point])
                    })
                })
                .collect();
            let data = stack(Axis(0), &points)?;

            let mut dims = vec![new_dim.to_string()];
            dims.extend(order[present.len()..].iter().map(|axis| var.dims[*axis].clone()));
            variables.push(Variable {
                name: var.name.clone(),
                dims,
                data,
            });
        }

        Ok(Self {
            coords,
            scalars: self.scalars.clone(),
            variables,
        })
    }

    /// Replace values with NaN wherever `mask` is false. `mask` is laid out as
    /// `(row_dim, col_dim)`. Variables lacking either dimension are left untouched.
    ///
    pub fn where_mask(&self, row_dim: &str, col_dim: &str, mask: &Array2<bool>) -> Result<Self> {
        let rows = self.require_coord(row_dim)?.len();
        let cols = self.require_coord(col_dim)?.len();
        if mask.dim() != (rows, cols) {
            return Err(Error::InvalidSelection(format!(
                "mask shape {:?} does not match ({row_dim}, {col_dim}) = ({rows}, {cols})",
                mask.dim()
            )));
        }

        let mut variables = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            let mut var = var.clone();
            if let Some(order) = var.front_order(&[row_dim, col_dim]) {
                let mut view = var.data.view_mut().permuted_axes(order);
                for ((row, col), keep) in mask.indexed_iter() {
                    if !*keep {
                        let mut plane = view.index_axis_mut(Axis(0), row);
                        plane.index_axis_mut(Axis(0), col).fill(f64::NAN);
                    }
                }
            }
            variables.push(var);
        }

        Ok(Self {
            coords: self.coords.clone(),
            scalars: self.scalars.clone(),
            variables,
        })
    }

    /// Append `other` to this dataset along `dim`.
    ///
    /// Both datasets must have the same dimensions with matching sizes on every dimension but
    /// `dim`, and `other` must provide every variable of this dataset that spans `dim`. Variables
    /// and coordinates that don't span `dim` are taken from `self`.
    ///
    pub fn concat(&self, other: &Dataset, dim: &str) -> Result<Self> {
        let mut coords = Vec::with_capacity(self.coords.len());
        for coord in &self.coords {
            let theirs = other.coord(&coord.name).ok_or_else(|| {
                Error::InvalidDataset(format!(
                    "cannot concatenate along '{dim}': other dataset lacks dimension '{}'",
                    coord.name
                ))
            })?;
            if coord.name == dim {
                coords.push(coord.concat(theirs)?);
            } else if coord.len() != theirs.len() {
                return Err(Error::InvalidDataset(format!(
                    "cannot concatenate along '{dim}': dimension '{}' has sizes {} and {}",
                    coord.name,
                    coord.len(),
                    theirs.len()
                )));
            } else {
                coords.push(coord.clone());
            }
        }
        if !coords.iter().any(|coord| coord.name == dim) {
            return Err(Error::InvalidDataset(format!(
                "cannot concatenate along missing dimension '{dim}'"
            )));
        }

        let mut variables = Vec::with_capacity(self.variables.len());
        for var in &self.variables {
            let axis = match var.axis_of(dim) {
                Some(axis) => axis,
                None => {
                    variables.push(var.clone());
                    continue;
                }
            };
            let theirs = other.get_variable(&var.name).ok_or_else(|| {
                Error::InvalidDataset(format!(
                    "cannot concatenate along '{dim}': other dataset lacks variable '{}'",
                    var.name
                ))
            })?;
            let order = var
                .dims
                .iter()
                .map(|d| theirs.axis_of(d))
                .collect::<Option<Vec<_>>>()
                .filter(|order| order.len() == theirs.dims.len())
                .ok_or_else(|| {
                    Error::InvalidDataset(format!(
                        "variable '{}' has dimensions {:?} and {:?}",
                        var.name, var.dims, theirs.dims
                    ))
                })?;
            let their_view = theirs.data.view().permuted_axes(order);
            let data = concatenate(Axis(axis), &[var.data.view(), their_view])?;
            variables.push(Variable {
                name: var.name.clone(),
                dims: var.dims.clone(),
                data,
            });
        }

        Ok(Self {
            coords,
            scalars: self.scalars.clone(),
            variables,
        })
    }

    fn match_position(&self, dim: &str, target: f64, method: MatchMethod) -> Result<usize> {
        let coord = self.require_coord(dim)?;
        let values: Vec<f64> = coord
            .comparable_values()
            .into_iter()
            .map(|value| value.unwrap_or(f64::NAN))
            .collect();

        match_index(&values, target, method).ok_or_else(|| {
            Error::NoDataFound(format!("no '{dim}' value matches {target} ({method:?})"))
        })
    }
}
