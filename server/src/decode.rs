//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Incremental UTF-8 decoding of byte chunks

/// Streaming UTF-8 decoder
///
/// Reads arrive in arbitrary byte chunks, so a multi-byte character may be
/// split across two reads. The decoder holds back an incomplete trailing
/// sequence until the next chunk completes it. Invalid sequences decode to
/// U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a decoder with no pending bytes
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk of bytes
    ///
    /// Returns the text that could be fully decoded. The result may be empty
    /// when the chunk only contains the start of a multi-byte character.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut output = String::with_capacity(input.len());
        let mut start = 0;
        while start < input.len() {
            match std::str::from_utf8(&input[start..]) {
                Ok(text) => {
                    output.push_str(text);
                    start = input.len();
                }
                Err(err) => {
                    let valid = start + err.valid_up_to();
                    output.push_str(&String::from_utf8_lossy(&input[start..valid]));
                    match err.error_len() {
                        Some(len) => {
                            output.push(char::REPLACEMENT_CHARACTER);
                            start = valid + len;
                        }
                        None => {
                            // Incomplete sequence at the end, wait for more bytes.
                            self.pending = input[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }

        output
    }

    /// Check if an incomplete sequence is being held back
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Flush any held-back bytes at end of stream
    ///
    /// An incomplete sequence can never be completed once the stream ends, so
    /// it decodes to replacement characters.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&pending).into_owned())
    }
}
