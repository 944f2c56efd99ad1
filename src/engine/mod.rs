//
// bimodalcp is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License  v3
// as published by the Free Software Foundation.
//
// bimodalcp is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY.
// See the GNU Lesser General Public License  for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with bimodalcp. If not, see http://www.gnu.org/licenses/lgpl-3.0.en.html
//
// Copyright (c)  2024 by the bimodalcp authors
//

//! This module provides the definition and implementation of the solver's
//! core abstractions: the variables and their domains, the propagators and
//! the propagation fixpoint.

mod domain;
mod model;

pub use domain::*;
pub use model::*;
