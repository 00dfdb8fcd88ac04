// SPDX-License-Identifier: Apache-2.0 OR MIT
// SPDX-FileCopyrightText: © 2024 Google

//! The controller backends

pub mod capture;
pub mod ch224q;
