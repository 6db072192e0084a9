// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Integration Tests
//!
//! End-to-end SVC tests: a kernel, the reference address space and
//! recording collaborators, driven through the SVC dispatcher.

mod syscall_tests;
