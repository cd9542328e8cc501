// SPDX-License-Identifier: Apache-2.0

mod file_id;
mod finder;

pub use file_id::FileId;
pub use finder::GlobFileFinder;
