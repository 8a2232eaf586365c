// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::Settings;

#[test]
fn test_defaults_load_without_files_or_env() {
    let settings = Settings::new().expect("defaults must load");

    assert_eq!(settings.server.host, "0.0.0.0");
    assert_eq!(settings.server.port, 3000);
    assert_eq!(settings.cache.default_ttl_seconds, 3600);
    assert_eq!(settings.rate_limiting.default_rpm, 60);
    assert!(settings.rate_limiting.enabled);
    assert_eq!(settings.concurrency.per_host_limit, 5);
    assert_eq!(settings.concurrency.workers, 4);
    assert_eq!(settings.concurrency.job_lease_seconds, 600);
    assert!(settings.search.serper_api_key.is_none());
    assert!(!settings.auth.key_hash_secret.is_empty());
}
