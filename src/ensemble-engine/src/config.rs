// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

/// Options for rendering runtime documents back to text format.
#[derive(Clone, Debug)]
pub struct WriterConfig {
    /// Spaces per nesting level.
    pub indent: usize,
    /// Drop top-level fields with empty values (`""`, `0`, `false`, `[]`,
    /// `{}`) before saving.  The UI sends every field it knows about, set or
    /// not, and the runtime rejects some of the empty ones.
    pub prune_empty: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            indent: 2,
            prune_empty: true,
        }
    }
}
