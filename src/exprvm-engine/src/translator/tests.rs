// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::*;

fn check(infix: &str, expected: &[&str]) {
    let mut expected = expected.join("\n");
    expected.push('\n');
    let postfix = translate(infix).unwrap_or_else(|err| panic!("{infix}: {err}"));
    assert_eq!(expected, postfix, "translating '{infix}'");
}

fn check_err(infix: &str, code: ErrorCode) {
    match translate(infix) {
        Ok(postfix) => panic!("expected {code} for '{infix}', got:\n{postfix}"),
        Err(err) => assert_eq!(code, err.code, "'{infix}' failed with {err}"),
    }
}

#[test]
fn logic() {
    check(
        "ret = A && (B || C);",
        &["READ A", "READ B", "READ C", "OR", "AND", "WRITE ret"],
    );
    check(
        "ret = (A && (B || C ^ D)) ^ E;",
        &[
            "READ A", "READ B", "READ C", "OR", "READ D", "XOR", "AND", "READ E", "XOR",
            "WRITE ret",
        ],
    );
    check("ret = !1;", &["CONST 1", "NOT", "WRITE ret"]);
    check("ret = !A;", &["READ A", "NOT", "WRITE ret"]);
    check("ret = A & B | C;", &["READ A", "READ B", "AND", "READ C", "OR", "WRITE ret"]);
}

#[test]
fn comparison() {
    check(
        "ret = A > (B < C);",
        &["READ A", "READ B", "READ C", "LT", "GT", "WRITE ret"],
    );
    check(
        "ret = A >= (B <= C < D);",
        &[
            "READ A", "READ B", "READ C", "LTE", "READ D", "LT", "GTE", "WRITE ret",
        ],
    );
    check(
        "ret = A == (B ^ C);",
        &["READ A", "READ B", "READ C", "XOR", "EQ", "WRITE ret"],
    );
    check(
        "ret = A != (B ^ C);",
        &["READ A", "READ B", "READ C", "XOR", "NEQ", "WRITE ret"],
    );
}

#[test]
fn arithmetic() {
    check("ret = A + b;", &["READ A", "READ b", "SUM", "WRITE ret"]);
    check("ret = A * b;", &["READ A", "READ b", "MUL", "WRITE ret"]);
    check("ret = (A + b);", &["READ A", "READ b", "SUM", "WRITE ret"]);
    check("ret = pow(A,b);", &["READ A", "READ b", "POW", "WRITE ret"]);
    check("ret = sin(A);", &["READ A", "SIN", "WRITE ret"]);
    check(
        "ret = A - B - C;",
        &["READ A", "READ B", "SUB", "READ C", "SUB", "WRITE ret"],
    );
}

#[test]
fn gravitation() {
    check(
        "F = G*((m1*m2)/pow(d, 2));",
        &[
            "READ G", "READ m1", "READ m2", "MUL", "READ d", "CONST 2", "POW", "DIV", "MUL",
            "WRITE F",
        ],
    );
}

#[test]
fn typecasts() {
    check(
        "ret = A + (float32) 0.99;",
        &["READ A", "CONST float32 0.99", "SUM", "WRITE ret"],
    );
    check("ret = A + 0.99;", &["READ A", "CONST 0.99", "SUM", "WRITE ret"]);
    check("ret = (bool) A;", &["READ A", "CAST bool", "WRITE ret"]);
    check(
        "ret = (bool)A*B;",
        &["READ A", "CAST bool", "READ B", "MUL", "WRITE ret"],
    );
    check(
        "ret = (int8)(A + B);",
        &["READ A", "READ B", "SUM", "CAST int8", "WRITE ret"],
    );
    check(
        "ret = -(float32)sin(A);",
        &["READ A", "SIN", "CAST float32", "NEG", "WRITE ret"],
    );
}

#[test]
fn prefix_signs() {
    check("ret = + A;", &["READ A", "WRITE ret"]);
    check(
        "ret = + A*(+C + B);",
        &["READ A", "READ C", "READ B", "SUM", "MUL", "WRITE ret"],
    );
    check("ret = - A;", &["READ A", "NEG", "WRITE ret"]);
    check(
        "ret = - A*(-C + B);",
        &[
            "READ A", "NEG", "READ C", "NEG", "READ B", "SUM", "MUL", "WRITE ret",
        ],
    );
    check(
        "ret = pow(-A,-B); ret= A*pow(B,-pow(X,Z));",
        &[
            "READ A", "NEG", "READ B", "NEG", "POW", "WRITE ret", "READ A", "READ B", "READ X",
            "READ Z", "POW", "NEG", "POW", "MUL", "WRITE ret",
        ],
    );
    check("ret = -(-A);", &["READ A", "NEG", "NEG", "WRITE ret"]);
}

#[test]
fn functions() {
    check(
        "ret = sin(A); ret = (cos(B + foo) + tan(log(D)));",
        &[
            "READ A", "SIN", "WRITE ret", "READ B", "READ foo", "SUM", "COS", "READ D", "LOG",
            "TAN", "SUM", "WRITE ret",
        ],
    );
    check(
        "ret = mean(A, -B, C);",
        &["READ A", "READ B", "NEG", "READ C", "MEAN", "WRITE ret"],
    );
    check(
        "ret = pow((sin(A) + cos(B + foo)),-tan(log(D)));",
        &[
            "READ A", "SIN", "READ B", "READ foo", "SUM", "COS", "SUM", "READ D", "LOG", "TAN",
            "NEG", "POW", "WRITE ret",
        ],
    );
}

#[test]
fn complete_expressions() {
    let expected = [
        "READ A",
        "READ B",
        "SUM",
        "SIN",
        "READ C",
        "READ D",
        "SUM",
        "CAST type",
        "READ E",
        "CAST bool",
        "CONST float 15",
        "SUM",
        "TAN",
        "MUL",
        "GT",
        "WRITE ret",
    ];
    check(
        "ret = sin(A +B) > ((type)(C+D) * tan((bool)E + (float)15));",
        &expected,
    );
    check(
        "ret=sin(A+B)>((type)(C+D)*tan((bool)E+(float)15));",
        &expected,
    );

    check(
        "ret = A+ (B*C-(D/-pow(E,F))*G)*H;",
        &[
            "READ A", "READ B", "READ C", "MUL", "READ D", "READ E", "READ F", "POW", "NEG",
            "DIV", "READ G", "MUL", "SUB", "READ H", "MUL", "SUM", "WRITE ret",
        ],
    );
    check(
        "ret = 5 + B*(float)C*!(X - Y) + sin(X + Y) + Z;",
        &[
            "CONST 5", "READ B", "READ C", "CAST float", "MUL", "READ X", "READ Y", "SUB",
            "NOT", "MUL", "SUM", "READ X", "READ Y", "SUM", "SIN", "SUM", "READ Z", "SUM",
            "WRITE ret",
        ],
    );
}

#[test]
fn multiple_assignments() {
    check(
        "ret = A +b; ret = C;",
        &["READ A", "READ b", "SUM", "WRITE ret", "READ C", "WRITE ret"],
    );
    check(
        "Z = (float)12, X = Z + 1;",
        &["CONST float 12", "WRITE Z", "READ Z", "CONST 1", "SUM", "WRITE X"],
    );
}

#[test]
fn errors() {
    check_err("", ErrorCode::EmptyEquation);
    check_err("// nothing here", ErrorCode::EmptyEquation);
    check_err("ret = A + b", ErrorCode::UnrecognizedEof);
    check_err("ret = (A + b;", ErrorCode::UnrecognizedToken);
    check_err("ret = A + b);", ErrorCode::ExtraToken);
    check_err("ret = A B;", ErrorCode::ExtraToken);
    check_err("= A;", ErrorCode::UnrecognizedToken);
    check_err("ret A;", ErrorCode::UnrecognizedToken);
    check_err("ret = ;", ErrorCode::UnrecognizedToken);
    check_err(";", ErrorCode::UnrecognizedToken);
    check_err("ret = --A;", ErrorCode::UnrecognizedToken);
    check_err("ret = A + * b;", ErrorCode::UnrecognizedToken);
    check_err("ret = pow(A,;", ErrorCode::UnrecognizedToken);
    check_err("ret = A; B", ErrorCode::UnrecognizedEof);
    check_err("ret = A $ B;", ErrorCode::UnrecognizedToken);
}

#[test]
fn error_positions() {
    let err = translate("ret = (A + b;").unwrap_err();
    assert_eq!((12, 13), (err.start, err.end));

    let err = translate("ret = A").unwrap_err();
    assert_eq!(ErrorCode::UnrecognizedEof, err.code);
    assert_eq!((7, 8), (err.start, err.end));
}
