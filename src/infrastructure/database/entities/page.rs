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

use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "pages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub url: String,
    pub canonical_url: String,
    #[sea_orm(unique)]
    pub url_hash: String,
    pub content_hash: Option<String>,
    pub status_code: Option<i32>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub markdown: Option<String>,
    pub raw_html: Option<String>,
    pub renderer: Option<String>,
    pub links_internal: Option<Vec<String>>,
    pub links_external: Option<Vec<String>>,
    pub word_count: Option<i32>,
    pub read_time_minutes: Option<i32>,
    pub fetch_duration_ms: Option<i32>,
    pub og_image: Option<String>,
    pub favicon_url: Option<String>,
    pub site_name: Option<String>,
    pub language: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<String>,
    pub fetched_at: ChronoDateTimeWithTimeZone,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
