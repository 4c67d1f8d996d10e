// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use chrono::TimeZone;
use chrono::Utc;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use sigv4_proxy_aws_v4::{CanonicalRequest, Credential, RequestSigner};
use sigv4_proxy_core::SignRequest;

criterion_group!(benches, bench);
criterion_main!(benches);

pub fn bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("aws_v4");

    let cred = Credential {
        access_key_id: "access_key_id".to_string(),
        secret_access_key: "secret_access_key".to_string(),
        ..Default::default()
    };
    let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
    let body = vec![b'x'; 16 * 1024];

    let request = || {
        http::Request::builder()
            .method(http::Method::PUT)
            .uri("https://search-demo.us-west-2.es.amazonaws.com/logs/_doc/1?refresh=true")
            .header("content-type", "application/json")
            .body(())
            .expect("request must be valid")
            .into_parts()
            .0
    };

    group.bench_function("canonical_request", |b| {
        let parts = request();
        b.iter(|| CanonicalRequest::build(&parts, &body, &[]).expect("must success"))
    });

    group.bench_function("sign_request", |b| {
        let signer = RequestSigner::new("es", "us-west-2");
        b.iter(|| {
            let mut parts = request();
            signer
                .sign_request(&mut parts, &body, &cred, now)
                .expect("must success")
        })
    });

    group.finish();
}
